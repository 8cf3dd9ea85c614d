//! Campaigns, plans, and the jobs that run them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// An applied `(campaign type, arguments)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPlan {
    pub id: DbId,
    pub campaign_type: String,
    pub arguments: serde_json::Value,
    pub canceled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CampaignPlan {
    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }
}

/// One repository's diff-generation attempt under a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignJob {
    pub id: DbId,
    pub campaign_plan_id: DbId,
    pub repo_id: DbId,
    /// Commit the diff was generated against.
    pub rev: String,
    pub base_ref: String,
    /// Empty until the attempt succeeds, or when it produced no change.
    pub diff: String,
    pub description: String,
    /// Empty unless the attempt failed.
    pub error: String,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CampaignJob {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// A finished job with a non-empty diff can be published.
    pub fn has_diff(&self) -> bool {
        self.is_finished() && !self.diff.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Campaigns
// ---------------------------------------------------------------------------

/// Exactly one owner of a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Namespace {
    User(DbId),
    Org(DbId),
}

impl Namespace {
    pub fn id(self) -> DbId {
        match self {
            Self::User(id) | Self::Org(id) => id,
        }
    }
}

/// A named batch of changesets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub author_id: DbId,
    pub namespace: Namespace,
    pub changeset_ids: BTreeSet<DbId>,
    pub campaign_plan_id: Option<DbId>,
    pub closed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Campaign {
    /// Attach a changeset; appending the same id twice keeps one copy.
    pub fn add_changeset(&mut self, changeset_id: DbId) {
        self.changeset_ids.insert(changeset_id);
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Changeset jobs
// ---------------------------------------------------------------------------

/// One attempt to publish an accepted diff as a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetJob {
    pub id: DbId,
    pub campaign_id: DbId,
    pub campaign_job_id: DbId,
    /// Zero until publication succeeds.
    pub changeset_id: DbId,
    pub error: String,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ChangesetJob {
    pub fn is_published(&self) -> bool {
        self.changeset_id != 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Failed attempts carry a non-blank error and both timestamps.
    pub fn is_failed(&self) -> bool {
        !self.error.trim().is_empty() && self.started_at.is_some() && self.finished_at.is_some()
    }

    /// Make the job claimable again.
    pub fn reset(&mut self) {
        self.error.clear();
        self.started_at = None;
        self.finished_at = None;
    }
}
