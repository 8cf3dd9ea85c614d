//! Canonical changeset events.
//!
//! Every provider-specific occurrence (a GitHub review, a Bitbucket Server
//! approval, ...) is normalized into a [`ChangesetEvent`]: a namespaced
//! [`ChangesetEventKind`], a deduplication key unique within
//! `(changeset, kind)`, and kind-typed [`EventMetadata`].
//!
//! A later observation of the same `(changeset, kind, key)` is folded into
//! the stored event with [`ChangesetEvent::update`], never replacing it.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::bitbucket_server::{Activity, ActivityAction};
use crate::error::CoreError;
use crate::github;
use crate::merge::MergeFrom;
use crate::review::ReviewState;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// What happened, namespaced by the code host it happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangesetEventKind {
    #[serde(rename = "github:assigned")]
    GitHubAssigned,
    #[serde(rename = "github:closed")]
    GitHubClosed,
    #[serde(rename = "github:commented")]
    GitHubCommented,
    #[serde(rename = "github:renamed")]
    GitHubRenamedTitle,
    #[serde(rename = "github:merged")]
    GitHubMerged,
    #[serde(rename = "github:reviewed")]
    GitHubReviewed,
    #[serde(rename = "github:reopened")]
    GitHubReopened,
    #[serde(rename = "github:review_dismissed")]
    GitHubReviewDismissed,
    #[serde(rename = "github:review_request_removed")]
    GitHubReviewRequestRemoved,
    #[serde(rename = "github:review_requested")]
    GitHubReviewRequested,
    #[serde(rename = "github:review_commented")]
    GitHubReviewCommented,
    #[serde(rename = "github:unassigned")]
    GitHubUnassigned,

    #[serde(rename = "bitbucketserver:approved")]
    BitbucketServerApproved,
    #[serde(rename = "bitbucketserver:unapproved")]
    BitbucketServerUnapproved,
    #[serde(rename = "bitbucketserver:declined")]
    BitbucketServerDeclined,
    #[serde(rename = "bitbucketserver:reviewed")]
    BitbucketServerReviewed,
    #[serde(rename = "bitbucketserver:opened")]
    BitbucketServerOpened,
    #[serde(rename = "bitbucketserver:reopened")]
    BitbucketServerReopened,
    #[serde(rename = "bitbucketserver:rescoped")]
    BitbucketServerRescoped,
    #[serde(rename = "bitbucketserver:updated")]
    BitbucketServerUpdated,
    #[serde(rename = "bitbucketserver:commented")]
    BitbucketServerCommented,
    #[serde(rename = "bitbucketserver:merged")]
    BitbucketServerMerged,
}

impl ChangesetEventKind {
    /// The kind recorded for a Bitbucket Server activity.
    pub fn for_activity(action: ActivityAction) -> Self {
        match action {
            ActivityAction::Approved => Self::BitbucketServerApproved,
            ActivityAction::Unapproved => Self::BitbucketServerUnapproved,
            ActivityAction::Declined => Self::BitbucketServerDeclined,
            ActivityAction::Reviewed => Self::BitbucketServerReviewed,
            ActivityAction::Opened => Self::BitbucketServerOpened,
            ActivityAction::Reopened => Self::BitbucketServerReopened,
            ActivityAction::Rescoped => Self::BitbucketServerRescoped,
            ActivityAction::Updated => Self::BitbucketServerUpdated,
            ActivityAction::Commented => Self::BitbucketServerCommented,
            ActivityAction::Merged => Self::BitbucketServerMerged,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHubAssigned => "github:assigned",
            Self::GitHubClosed => "github:closed",
            Self::GitHubCommented => "github:commented",
            Self::GitHubRenamedTitle => "github:renamed",
            Self::GitHubMerged => "github:merged",
            Self::GitHubReviewed => "github:reviewed",
            Self::GitHubReopened => "github:reopened",
            Self::GitHubReviewDismissed => "github:review_dismissed",
            Self::GitHubReviewRequestRemoved => "github:review_request_removed",
            Self::GitHubReviewRequested => "github:review_requested",
            Self::GitHubReviewCommented => "github:review_commented",
            Self::GitHubUnassigned => "github:unassigned",
            Self::BitbucketServerApproved => "bitbucketserver:approved",
            Self::BitbucketServerUnapproved => "bitbucketserver:unapproved",
            Self::BitbucketServerDeclined => "bitbucketserver:declined",
            Self::BitbucketServerReviewed => "bitbucketserver:reviewed",
            Self::BitbucketServerOpened => "bitbucketserver:opened",
            Self::BitbucketServerReopened => "bitbucketserver:reopened",
            Self::BitbucketServerRescoped => "bitbucketserver:rescoped",
            Self::BitbucketServerUpdated => "bitbucketserver:updated",
            Self::BitbucketServerCommented => "bitbucketserver:commented",
            Self::BitbucketServerMerged => "bitbucketserver:merged",
        }
    }
}

impl fmt::Display for ChangesetEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Kind-typed payload of an event, one variant per concrete shape.
///
/// Several kinds share a shape: assigned/unassigned both carry an
/// [`github::AssignmentEvent`], and every Bitbucket Server kind carries an
/// [`Activity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventMetadata {
    GitHubAssignment(github::AssignmentEvent),
    GitHubClosed(github::ClosedEvent),
    GitHubComment(github::IssueComment),
    GitHubRenamedTitle(github::RenamedTitleEvent),
    GitHubMerged(github::MergedEvent),
    GitHubReview(github::PullRequestReview),
    GitHubReviewComment(github::PullRequestReviewComment),
    GitHubReopened(github::ReopenedEvent),
    GitHubReviewDismissed(github::ReviewDismissedEvent),
    GitHubReviewRequest(github::ReviewRequestEvent),
    BitbucketServerActivity(Activity),
}

impl EventMetadata {
    /// Deduplication key, unique within `(changeset, kind)`.
    pub fn key(&self) -> String {
        match self {
            Self::GitHubAssignment(e) => e.key(),
            Self::GitHubClosed(e) => e.key(),
            Self::GitHubComment(e) => e.key(),
            Self::GitHubRenamedTitle(e) => e.key(),
            Self::GitHubMerged(e) => e.key(),
            Self::GitHubReview(e) => e.key(),
            Self::GitHubReviewComment(e) => e.key(),
            Self::GitHubReopened(e) => e.key(),
            Self::GitHubReviewDismissed(e) => e.key(),
            Self::GitHubReviewRequest(e) => e.key(),
            Self::BitbucketServerActivity(e) => e.key(),
        }
    }

    /// When the occurrence happened on the code host, if known.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Self::GitHubAssignment(e) => e.created_at,
            Self::GitHubClosed(e) => e.created_at,
            Self::GitHubComment(e) => e.created_at,
            Self::GitHubRenamedTitle(e) => e.created_at,
            Self::GitHubMerged(e) => e.created_at,
            Self::GitHubReview(e) => e.created_at,
            Self::GitHubReviewComment(e) => e.created_at,
            Self::GitHubReopened(e) => e.created_at,
            Self::GitHubReviewDismissed(e) => e.created_at,
            Self::GitHubReviewRequest(e) => e.created_at,
            Self::BitbucketServerActivity(e) => e.created_at(),
        }
    }

    /// Patch `self` with `other`, field by field.
    ///
    /// # Panics
    ///
    /// Panics when the two values are different shapes. Events sharing a
    /// `(changeset, kind, key)` always share a shape, so a mismatch means a
    /// kind was paired with the wrong metadata upstream.
    pub fn merge_from(&mut self, other: &EventMetadata) {
        match (self, other) {
            (Self::GitHubAssignment(a), Self::GitHubAssignment(b)) => a.merge_from(b),
            (Self::GitHubClosed(a), Self::GitHubClosed(b)) => a.merge_from(b),
            (Self::GitHubComment(a), Self::GitHubComment(b)) => a.merge_from(b),
            (Self::GitHubRenamedTitle(a), Self::GitHubRenamedTitle(b)) => a.merge_from(b),
            (Self::GitHubMerged(a), Self::GitHubMerged(b)) => a.merge_from(b),
            (Self::GitHubReview(a), Self::GitHubReview(b)) => a.merge_from(b),
            (Self::GitHubReviewComment(a), Self::GitHubReviewComment(b)) => a.merge_from(b),
            (Self::GitHubReopened(a), Self::GitHubReopened(b)) => a.merge_from(b),
            (Self::GitHubReviewDismissed(a), Self::GitHubReviewDismissed(b)) => a.merge_from(b),
            (Self::GitHubReviewRequest(a), Self::GitHubReviewRequest(b)) => a.merge_from(b),
            (Self::BitbucketServerActivity(a), Self::BitbucketServerActivity(b)) => {
                a.merge_from(b)
            }
            (current, incoming) => panic!(
                "cannot merge event metadata of different shapes: {} into {}",
                incoming.shape(),
                current.shape()
            ),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Self::GitHubAssignment(_) => "GitHubAssignment",
            Self::GitHubClosed(_) => "GitHubClosed",
            Self::GitHubComment(_) => "GitHubComment",
            Self::GitHubRenamedTitle(_) => "GitHubRenamedTitle",
            Self::GitHubMerged(_) => "GitHubMerged",
            Self::GitHubReview(_) => "GitHubReview",
            Self::GitHubReviewComment(_) => "GitHubReviewComment",
            Self::GitHubReopened(_) => "GitHubReopened",
            Self::GitHubReviewDismissed(_) => "GitHubReviewDismissed",
            Self::GitHubReviewRequest(_) => "GitHubReviewRequest",
            Self::BitbucketServerActivity(_) => "BitbucketServerActivity",
        }
    }
}

// ---------------------------------------------------------------------------
// ChangesetEvent
// ---------------------------------------------------------------------------

/// One normalized, deduplicated occurrence in a changeset's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesetEvent {
    /// Store-assigned; zero until persisted.
    pub id: DbId,
    pub changeset_id: DbId,
    pub kind: ChangesetEventKind,
    pub key: String,
    pub metadata: EventMetadata,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChangesetEvent {
    /// Build an unsaved event; the key is derived from the metadata.
    pub fn new(changeset_id: DbId, kind: ChangesetEventKind, metadata: EventMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            changeset_id,
            kind,
            key: metadata.key(),
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build an unsaved event for a Bitbucket Server activity.
    pub fn from_activity(changeset_id: DbId, activity: Activity) -> Self {
        let kind = ChangesetEventKind::for_activity(activity.action);
        Self::new(changeset_id, kind, EventMetadata::BitbucketServerActivity(activity))
    }

    /// Whether `other` describes the same occurrence as `self`.
    pub fn same_identity(&self, other: &ChangesetEvent) -> bool {
        self.changeset_id == other.changeset_id && self.kind == other.kind && self.key == other.key
    }

    /// When the occurrence happened on the code host, if known.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.metadata.timestamp()
    }

    /// Fold a later observation of the same occurrence into this event.
    ///
    /// A no-op when `other` has a different `(changeset, kind, key)`.
    ///
    /// # Panics
    ///
    /// See [`EventMetadata::merge_from`].
    pub fn update(&mut self, other: &ChangesetEvent) {
        if !self.same_identity(other) {
            return;
        }
        self.metadata.merge_from(&other.metadata);
    }

    /// Review state expressed by a review-type event.
    pub fn review_state(&self) -> Result<ReviewState, CoreError> {
        match (self.kind, &self.metadata) {
            (ChangesetEventKind::GitHubReviewed, EventMetadata::GitHubReview(review)) => {
                Ok(ReviewState::from_provider(&review.state))
            }
            (ChangesetEventKind::BitbucketServerApproved, _) => Ok(ReviewState::Approved),
            (ChangesetEventKind::BitbucketServerReviewed, _) => Ok(ReviewState::ChangesRequested),
            (ChangesetEventKind::BitbucketServerUnapproved, _) => Ok(ReviewState::Pending),
            (kind, _) => Err(CoreError::Internal(format!(
                "event of kind {kind} carries no review state"
            ))),
        }
    }

    /// Login or user name of whoever submitted a review-type event.
    pub fn review_author(&self) -> Result<&str, CoreError> {
        match &self.metadata {
            EventMetadata::GitHubReview(review) => Ok(&review.author.login),
            EventMetadata::BitbucketServerActivity(activity) => Ok(&activity.user.name),
            _ => Err(CoreError::Internal(format!(
                "event of kind {} has no review author",
                self.kind
            ))),
        }
    }
}
