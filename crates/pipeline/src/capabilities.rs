//! Narrow contracts for the collaborators outside this process.

use std::sync::Arc;

use armada_core::changeset::{Changeset, ChangesetMetadata};
use armada_core::repo::{ExternalService, Repo};
use async_trait::async_trait;

/// Boxed error returned by capability implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Repository search and revision resolution
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RepoSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Repo>, BoxError>;
}

/// Default branch and its head commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRevision {
    /// Fully qualified, e.g. `refs/heads/main`.
    pub ref_name: String,
    pub commit_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Empty repositories and the like; callers skip the repository.
    #[error("repository {0} has no default branch")]
    NoDefaultBranch(String),

    #[error(transparent)]
    Other(BoxError),
}

#[async_trait]
pub trait DefaultBranchResolver: Send + Sync {
    async fn resolve(&self, repo: &Repo) -> Result<ResolvedRevision, ResolveError>;
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub message: String,
    pub author_name: String,
    pub author_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCommitFromPatchRequest {
    pub repo: String,
    pub base_commit: String,
    pub patch: String,
    pub target_ref: String,
    pub commit_info: CommitInfo,
    pub git_apply_args: Vec<String>,
    pub push: bool,
}

#[async_trait]
pub trait GitClient: Send + Sync {
    /// Apply a patch on top of `base_commit`, commit it to `target_ref`
    /// and optionally push. Returns the ref that was written.
    async fn create_commit_from_patch(
        &self,
        request: CreateCommitFromPatchRequest,
    ) -> Result<String, BoxError>;
}

// ---------------------------------------------------------------------------
// Code hosts
// ---------------------------------------------------------------------------

/// What to open on the code host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChangeset {
    pub title: String,
    pub body: String,
    pub head_ref: String,
    pub base_ref: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedChangeset {
    pub external_id: String,
    pub metadata: ChangesetMetadata,
    /// The code host already had an open pull request for this head ref.
    pub already_existed: bool,
}

/// Create and refresh changesets on one code-host connection.
#[async_trait]
pub trait ChangesetSource: Send + Sync {
    async fn create_changeset(
        &self,
        repo: &Repo,
        changeset: &NewChangeset,
    ) -> Result<CreatedChangeset, BoxError>;

    /// Refresh the metadata of every changeset in place, including the
    /// history its `events()` accessor derives from.
    async fn load_changesets(&self, changesets: &mut [Changeset]) -> Result<(), BoxError>;
}

/// Hands out the [`ChangesetSource`] for a connection.
pub trait SourceFactory: Send + Sync {
    fn source_for(&self, service: &ExternalService) -> Result<Arc<dyn ChangesetSource>, BoxError>;
}

/// Webhook endpoint a code host should deliver to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub name: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
}

#[async_trait]
pub trait WebhookRegistrar: Send + Sync {
    /// Create the webhook, or update it in place when one with the same
    /// name exists.
    async fn upsert_webhook(
        &self,
        service: &ExternalService,
        registration: &WebhookRegistration,
    ) -> Result<(), BoxError>;
}
