//! Changesets: pull requests opened on a code host.
//!
//! The code-host representation is kept verbatim in [`ChangesetMetadata`];
//! everything the rest of the system needs (title, state, review state,
//! event history, ...) is derived from it by the accessors below.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::bitbucket_server;
use crate::error::CoreError;
use crate::events::{ChangesetEvent, ChangesetEventKind, EventMetadata};
use crate::github::{self, TimelineItem};
use crate::review::{compute_review_state, select_review_state, ReviewState};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangesetState {
    Open,
    Closed,
    Merged,
    Deleted,
}

/// Service-typed pull request as last seen on the code host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangesetMetadata {
    GitHub(github::PullRequest),
    BitbucketServer(bitbucket_server::PullRequest),
    /// A shape this build does not understand.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: DbId,
    pub repo_id: DbId,
    /// Campaigns this changeset belongs to.
    pub campaign_ids: BTreeSet<DbId>,
    /// Identifier on the code host (pull request number or id).
    pub external_id: String,
    pub external_service_type: String,
    pub metadata: ChangesetMetadata,
    pub external_deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Changeset {
    pub fn add_campaign(&mut self, campaign_id: DbId) {
        self.campaign_ids.insert(campaign_id);
    }

    pub fn title(&self) -> Result<&str, CoreError> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => Ok(&pr.title),
            ChangesetMetadata::BitbucketServer(pr) => Ok(&pr.title),
            ChangesetMetadata::Unknown => Err(CoreError::UnknownChangesetType),
        }
    }

    pub fn body(&self) -> Result<&str, CoreError> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => Ok(&pr.body),
            ChangesetMetadata::BitbucketServer(pr) => Ok(&pr.description),
            ChangesetMetadata::Unknown => Err(CoreError::UnknownChangesetType),
        }
    }

    pub fn url(&self) -> Result<&str, CoreError> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => Ok(&pr.url),
            ChangesetMetadata::BitbucketServer(pr) => Ok(pr.url()),
            ChangesetMetadata::Unknown => Err(CoreError::UnknownChangesetType),
        }
    }

    /// Current state. A changeset deleted on the code host is `Deleted`
    /// whatever its metadata says.
    pub fn state(&self) -> Result<ChangesetState, CoreError> {
        if self.external_deleted_at.is_some() {
            return Ok(ChangesetState::Deleted);
        }
        let raw = match &self.metadata {
            ChangesetMetadata::GitHub(pr) => pr.state.as_str(),
            ChangesetMetadata::BitbucketServer(pr) => pr.state.as_str(),
            ChangesetMetadata::Unknown => return Err(CoreError::UnknownChangesetType),
        };
        match raw {
            "OPEN" => Ok(ChangesetState::Open),
            "CLOSED" | "DECLINED" => Ok(ChangesetState::Closed),
            "MERGED" => Ok(ChangesetState::Merged),
            other => Err(CoreError::Validation(format!(
                "unknown changeset state {other:?}"
            ))),
        }
    }

    /// Fully qualified head ref.
    pub fn head_ref(&self) -> Result<String, CoreError> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => Ok(qualify_branch(&pr.head_ref_name)),
            ChangesetMetadata::BitbucketServer(pr) => Ok(pr.from_ref.id.clone()),
            ChangesetMetadata::Unknown => Err(CoreError::UnknownChangesetType),
        }
    }

    /// Fully qualified base ref.
    pub fn base_ref(&self) -> Result<String, CoreError> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => Ok(qualify_branch(&pr.base_ref_name)),
            ChangesetMetadata::BitbucketServer(pr) => Ok(pr.to_ref.id.clone()),
            ChangesetMetadata::Unknown => Err(CoreError::UnknownChangesetType),
        }
    }

    /// Aggregate review state from the latest decisive review per author.
    pub fn review_state(&self) -> Result<ReviewState, CoreError> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => {
                let mut by_author: HashMap<String, (Option<Timestamp>, ReviewState)> =
                    HashMap::new();
                for item in &pr.timeline_items {
                    let TimelineItem::PullRequestReview(review) = item else {
                        continue;
                    };
                    let state = ReviewState::from_provider(&review.state);
                    if !state.is_decisive() {
                        continue;
                    }
                    let entry = by_author
                        .entry(review.author.login.clone())
                        .or_insert((review.created_at, state));
                    if review.created_at >= entry.0 {
                        *entry = (review.created_at, state);
                    }
                }
                let latest: HashMap<String, ReviewState> = by_author
                    .into_iter()
                    .map(|(author, (_, state))| (author, state))
                    .collect();
                Ok(compute_review_state(&latest))
            }
            ChangesetMetadata::BitbucketServer(pr) => Ok(select_review_state(
                pr.reviewers
                    .iter()
                    .map(|r| ReviewState::from_provider(&r.status)),
            )),
            ChangesetMetadata::Unknown => Err(CoreError::UnknownChangesetType),
        }
    }

    /// When the pull request was opened on the code host, if known.
    pub fn external_created_at(&self) -> Option<Timestamp> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => pr.created_at,
            ChangesetMetadata::BitbucketServer(pr) => bitbucket_server::from_millis(pr.created_date),
            ChangesetMetadata::Unknown => None,
        }
    }

    pub fn external_updated_at(&self) -> Option<Timestamp> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => pr.updated_at,
            ChangesetMetadata::BitbucketServer(pr) => bitbucket_server::from_millis(pr.updated_date),
            ChangesetMetadata::Unknown => None,
        }
    }

    /// Unsaved events for every occurrence recorded in the metadata.
    pub fn events(&self) -> Vec<ChangesetEvent> {
        match &self.metadata {
            ChangesetMetadata::GitHub(pr) => pr
                .timeline_items
                .iter()
                .flat_map(|item| github_events(self.id, item))
                .collect(),
            ChangesetMetadata::BitbucketServer(pr) => pr
                .activities
                .iter()
                .map(|activity| ChangesetEvent::from_activity(self.id, activity.clone()))
                .collect(),
            ChangesetMetadata::Unknown => Vec::new(),
        }
    }
}

fn qualify_branch(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}

fn github_events(changeset_id: DbId, item: &TimelineItem) -> Vec<ChangesetEvent> {
    use ChangesetEventKind as K;
    use EventMetadata as M;

    let (kind, metadata) = match item {
        TimelineItem::AssignedEvent(e) => (K::GitHubAssigned, M::GitHubAssignment(e.clone())),
        TimelineItem::UnassignedEvent(e) => (K::GitHubUnassigned, M::GitHubAssignment(e.clone())),
        TimelineItem::ClosedEvent(e) => (K::GitHubClosed, M::GitHubClosed(e.clone())),
        TimelineItem::IssueComment(e) => (K::GitHubCommented, M::GitHubComment(e.clone())),
        TimelineItem::RenamedTitleEvent(e) => {
            (K::GitHubRenamedTitle, M::GitHubRenamedTitle(e.clone()))
        }
        TimelineItem::MergedEvent(e) => (K::GitHubMerged, M::GitHubMerged(e.clone())),
        TimelineItem::PullRequestReview(e) => (K::GitHubReviewed, M::GitHubReview(e.clone())),
        TimelineItem::PullRequestReviewThread(thread) => {
            return thread
                .comments
                .iter()
                .map(|c| {
                    ChangesetEvent::new(
                        changeset_id,
                        K::GitHubReviewCommented,
                        M::GitHubReviewComment(c.clone()),
                    )
                })
                .collect();
        }
        TimelineItem::ReopenedEvent(e) => (K::GitHubReopened, M::GitHubReopened(e.clone())),
        TimelineItem::ReviewDismissedEvent(e) => {
            (K::GitHubReviewDismissed, M::GitHubReviewDismissed(e.clone()))
        }
        TimelineItem::ReviewRequestedEvent(e) => {
            (K::GitHubReviewRequested, M::GitHubReviewRequest(e.clone()))
        }
        TimelineItem::ReviewRequestRemovedEvent(e) => {
            (K::GitHubReviewRequestRemoved, M::GitHubReviewRequest(e.clone()))
        }
    };
    vec![ChangesetEvent::new(changeset_id, kind, metadata)]
}
