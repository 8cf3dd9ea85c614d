//! Bitbucket Server pull-request metadata and activities.
//!
//! Timestamps on this host are milliseconds since the Unix epoch.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::merge::{merge_id, merge_option, merge_text, MergeFrom};
use crate::types::Timestamp;

/// Convert a millisecond epoch timestamp, treating zero as unknown.
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    if millis == 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email_address: String,
    pub display_name: String,
    pub slug: String,
}

impl MergeFrom for User {
    fn merge_from(&mut self, other: &Self) {
        merge_id(&mut self.id, other.id);
        merge_text(&mut self.name, &other.name);
        merge_text(&mut self.email_address, &other.email_address);
        merge_text(&mut self.display_name, &other.display_name);
        merge_text(&mut self.slug, &other.slug);
    }
}

/// Author or reviewer of a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Participant {
    pub user: User,
    /// `AUTHOR`, `REVIEWER` or `PARTICIPANT`.
    pub role: String,
    pub approved: bool,
    /// `APPROVED`, `NEEDS_WORK` or `UNAPPROVED`.
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ref {
    /// Fully qualified ref, e.g. `refs/heads/main`.
    pub id: String,
    pub display_id: String,
    pub latest_commit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_links: Vec<Link>,
}

/// A pull request as returned by the Bitbucket Server REST API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequest {
    pub id: i64,
    pub version: i64,
    pub title: String,
    pub description: String,
    /// `OPEN`, `DECLINED` or `MERGED`.
    pub state: String,
    pub created_date: i64,
    pub updated_date: i64,
    pub from_ref: Ref,
    pub to_ref: Ref,
    pub author: Participant,
    pub reviewers: Vec<Participant>,
    pub links: Links,
    /// Activity feed, filled by the source when refreshing.
    pub activities: Vec<Activity>,
}

impl PullRequest {
    pub fn url(&self) -> &str {
        self.links
            .self_links
            .first()
            .map(|l| l.href.as_str())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Approved,
    Unapproved,
    Declined,
    Reviewed,
    Opened,
    Reopened,
    Rescoped,
    Updated,
    Commented,
    Merged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    pub id: i64,
    pub version: i64,
    pub text: String,
    pub author: User,
    pub created_date: i64,
    pub updated_date: i64,
}

impl MergeFrom for Comment {
    fn merge_from(&mut self, other: &Self) {
        merge_id(&mut self.id, other.id);
        if other.version > self.version {
            self.version = other.version;
        }
        merge_text(&mut self.text, &other.text);
        self.author.merge_from(&other.author);
        merge_earliest_millis(&mut self.created_date, other.created_date);
        merge_latest_millis(&mut self.updated_date, other.updated_date);
    }
}

/// One entry of a pull request's activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub created_date: i64,
    #[serde(default)]
    pub user: User,
    pub action: ActivityAction,
    #[serde(default)]
    pub comment_action: String,
    #[serde(default)]
    pub comment: Option<Comment>,
}

impl Activity {
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        from_millis(self.created_date)
    }
}

impl MergeFrom for Activity {
    fn merge_from(&mut self, other: &Self) {
        merge_id(&mut self.id, other.id);
        merge_earliest_millis(&mut self.created_date, other.created_date);
        self.user.merge_from(&other.user);
        self.action = other.action;
        merge_text(&mut self.comment_action, &other.comment_action);
        merge_option(&mut self.comment, &other.comment);
    }
}

fn merge_earliest_millis(current: &mut i64, incoming: i64) {
    if incoming != 0 && (*current == 0 || incoming < *current) {
        *current = incoming;
    }
}

fn merge_latest_millis(current: &mut i64, incoming: i64) {
    if incoming > *current {
        *current = incoming;
    }
}
