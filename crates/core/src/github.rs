//! GitHub pull-request metadata and timeline items.
//!
//! Shapes follow the GraphQL API (camelCase field names). The same structs
//! are filled from webhook payloads, which carry only a subset of the
//! fields, and are reconciled through [`MergeFrom`].

use serde::{Deserialize, Serialize};

use crate::merge::{
    merge_created_at, merge_flag, merge_id, merge_option, merge_text, merge_updated_at, MergeFrom,
};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Pull request
// ---------------------------------------------------------------------------

/// A GitHub user or bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Actor {
    pub login: String,
    pub avatar_url: String,
    pub url: String,
}

impl MergeFrom for Actor {
    fn merge_from(&mut self, other: &Self) {
        merge_text(&mut self.login, &other.login);
        merge_text(&mut self.avatar_url, &other.avatar_url);
        merge_text(&mut self.url, &other.url);
    }
}

/// A pull request as returned by the GitHub API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequest {
    /// GraphQL node id.
    pub id: String,
    pub number: i64,
    pub title: String,
    pub body: String,
    /// `OPEN`, `CLOSED` or `MERGED`.
    pub state: String,
    pub url: String,
    pub head_ref_name: String,
    pub base_ref_name: String,
    pub author: Actor,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub timeline_items: Vec<TimelineItem>,
}

/// One entry of a pull request's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "item")]
pub enum TimelineItem {
    AssignedEvent(AssignmentEvent),
    UnassignedEvent(AssignmentEvent),
    ClosedEvent(ClosedEvent),
    IssueComment(IssueComment),
    RenamedTitleEvent(RenamedTitleEvent),
    MergedEvent(MergedEvent),
    PullRequestReview(PullRequestReview),
    PullRequestReviewThread(PullRequestReviewThread),
    ReopenedEvent(ReopenedEvent),
    ReviewDismissedEvent(ReviewDismissedEvent),
    ReviewRequestedEvent(ReviewRequestEvent),
    ReviewRequestRemovedEvent(ReviewRequestEvent),
}

fn unix(ts: Option<Timestamp>) -> i64 {
    ts.map(|t| t.timestamp()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Timeline item shapes
// ---------------------------------------------------------------------------

/// Someone was assigned to, or unassigned from, the pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignmentEvent {
    pub actor: Actor,
    pub assignee: Actor,
    pub created_at: Option<Timestamp>,
}

impl AssignmentEvent {
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.actor.login,
            self.assignee.login,
            unix(self.created_at)
        )
    }
}

impl MergeFrom for AssignmentEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        self.assignee.merge_from(&other.assignee);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClosedEvent {
    pub actor: Actor,
    pub url: String,
    pub created_at: Option<Timestamp>,
}

impl ClosedEvent {
    pub fn key(&self) -> String {
        format!("{}:{}", self.actor.login, unix(self.created_at))
    }
}

impl MergeFrom for ClosedEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        merge_text(&mut self.url, &other.url);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}

/// A top-level comment on the pull request conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueComment {
    pub database_id: i64,
    pub author: Actor,
    pub editor: Option<Actor>,
    pub author_association: String,
    pub body: String,
    pub url: String,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub includes_created_edit: bool,
}

impl IssueComment {
    pub fn key(&self) -> String {
        self.database_id.to_string()
    }
}

impl MergeFrom for IssueComment {
    fn merge_from(&mut self, other: &Self) {
        merge_id(&mut self.database_id, other.database_id);
        self.author.merge_from(&other.author);
        merge_option(&mut self.editor, &other.editor);
        merge_text(&mut self.author_association, &other.author_association);
        merge_text(&mut self.body, &other.body);
        merge_text(&mut self.url, &other.url);
        merge_created_at(&mut self.created_at, other.created_at);
        merge_updated_at(&mut self.updated_at, other.updated_at);
        merge_flag(&mut self.includes_created_edit, other.includes_created_edit);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenamedTitleEvent {
    pub actor: Actor,
    pub previous_title: String,
    pub current_title: String,
    pub created_at: Option<Timestamp>,
}

impl RenamedTitleEvent {
    pub fn key(&self) -> String {
        format!("{}:{}", self.actor.login, unix(self.created_at))
    }
}

impl MergeFrom for RenamedTitleEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        merge_text(&mut self.previous_title, &other.previous_title);
        merge_text(&mut self.current_title, &other.current_title);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergedEvent {
    pub actor: Actor,
    pub merge_ref_name: String,
    pub url: String,
    pub commit_oid: String,
    pub created_at: Option<Timestamp>,
}

impl MergedEvent {
    pub fn key(&self) -> String {
        format!("{}:{}", self.actor.login, unix(self.created_at))
    }
}

impl MergeFrom for MergedEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        merge_text(&mut self.merge_ref_name, &other.merge_ref_name);
        merge_text(&mut self.url, &other.url);
        merge_text(&mut self.commit_oid, &other.commit_oid);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}

/// A submitted review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequestReview {
    pub database_id: i64,
    pub author: Actor,
    pub author_association: String,
    pub body: String,
    /// `APPROVED`, `CHANGES_REQUESTED`, `COMMENTED`, `DISMISSED` or `PENDING`.
    pub state: String,
    pub url: String,
    pub commit_oid: String,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub includes_created_edit: bool,
}

impl PullRequestReview {
    pub fn key(&self) -> String {
        self.database_id.to_string()
    }
}

impl MergeFrom for PullRequestReview {
    fn merge_from(&mut self, other: &Self) {
        merge_id(&mut self.database_id, other.database_id);
        self.author.merge_from(&other.author);
        merge_text(&mut self.author_association, &other.author_association);
        merge_text(&mut self.body, &other.body);
        merge_text(&mut self.state, &other.state);
        merge_text(&mut self.url, &other.url);
        merge_text(&mut self.commit_oid, &other.commit_oid);
        merge_created_at(&mut self.created_at, other.created_at);
        merge_updated_at(&mut self.updated_at, other.updated_at);
        merge_flag(&mut self.includes_created_edit, other.includes_created_edit);
    }
}

/// A comment attached to a line of the diff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequestReviewComment {
    pub database_id: i64,
    pub author: Actor,
    pub author_association: String,
    pub body: String,
    pub url: String,
    pub commit_oid: String,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub includes_created_edit: bool,
}

impl PullRequestReviewComment {
    pub fn key(&self) -> String {
        self.database_id.to_string()
    }
}

impl MergeFrom for PullRequestReviewComment {
    fn merge_from(&mut self, other: &Self) {
        merge_id(&mut self.database_id, other.database_id);
        self.author.merge_from(&other.author);
        merge_text(&mut self.author_association, &other.author_association);
        merge_text(&mut self.body, &other.body);
        merge_text(&mut self.url, &other.url);
        merge_text(&mut self.commit_oid, &other.commit_oid);
        merge_created_at(&mut self.created_at, other.created_at);
        merge_updated_at(&mut self.updated_at, other.updated_at);
        merge_flag(&mut self.includes_created_edit, other.includes_created_edit);
    }
}

/// A thread of review comments. Only its comments become events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequestReviewThread {
    pub comments: Vec<PullRequestReviewComment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReopenedEvent {
    pub actor: Actor,
    pub created_at: Option<Timestamp>,
}

impl ReopenedEvent {
    pub fn key(&self) -> String {
        format!("{}:{}", self.actor.login, unix(self.created_at))
    }
}

impl MergeFrom for ReopenedEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewDismissedEvent {
    pub actor: Actor,
    pub review: PullRequestReview,
    pub dismissal_message: String,
    pub created_at: Option<Timestamp>,
}

impl ReviewDismissedEvent {
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.actor.login,
            self.review.database_id,
            unix(self.created_at)
        )
    }
}

impl MergeFrom for ReviewDismissedEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        self.review.merge_from(&other.review);
        merge_text(&mut self.dismissal_message, &other.dismissal_message);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}

/// A review was requested from, or the request withdrawn from, a reviewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewRequestEvent {
    pub actor: Actor,
    pub requested_reviewer: Actor,
    pub created_at: Option<Timestamp>,
}

impl ReviewRequestEvent {
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.actor.login,
            self.requested_reviewer.login,
            unix(self.created_at)
        )
    }
}

impl MergeFrom for ReviewRequestEvent {
    fn merge_from(&mut self, other: &Self) {
        self.actor.merge_from(&other.actor);
        self.requested_reviewer.merge_from(&other.requested_reviewer);
        merge_created_at(&mut self.created_at, other.created_at);
    }
}
