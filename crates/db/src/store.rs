//! The `Store` collaborator.

use std::sync::Arc;

use armada_core::campaign::{Campaign, CampaignJob, CampaignPlan, ChangesetJob};
use armada_core::changeset::Changeset;
use armada_core::events::{ChangesetEvent, ChangesetEventKind};
use armada_core::repo::{ExternalService, ExternalServiceKind, Repo};
use armada_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::error::StoreError;

/// Cursor pagination for every `list_*` operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only rows with an id greater than this are returned; `0` starts at
    /// the beginning.
    pub cursor: DbId,
    /// Page size; `0` means unlimited.
    pub limit: usize,
}

impl ListOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page(cursor: DbId, limit: usize) -> Self {
        Self { cursor, limit }
    }
}

/// One page of results. `next_cursor` is `0` when there are no more pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: DbId,
}

/// Persistence for campaigns, plans, jobs, changesets and their events.
///
/// Operations on a handle returned by [`Store::transact`] are atomic with
/// respect to every other handle: they are applied together when the
/// transaction finishes successfully and discarded when it fails.
#[async_trait]
pub trait Store: Send + Sync {
    // -- transactions -------------------------------------------------------

    /// Begin a transaction. Calling this on a transaction handle returns a
    /// handle joined to the outer transaction, whose `done` is a no-op.
    async fn transact(&self) -> Result<Arc<dyn Store>, StoreError>;

    /// Finish the transaction: commit, or roll back when `failed`.
    /// A no-op on a non-transactional handle.
    async fn done(&self, failed: bool);

    // -- campaign plans -----------------------------------------------------

    async fn create_campaign_plan(&self, plan: CampaignPlan) -> Result<CampaignPlan, StoreError>;
    async fn get_campaign_plan(&self, id: DbId) -> Result<CampaignPlan, StoreError>;
    async fn update_campaign_plan(&self, plan: &CampaignPlan) -> Result<CampaignPlan, StoreError>;
    async fn delete_campaign_plan(&self, id: DbId) -> Result<(), StoreError>;
    async fn list_campaign_plans(&self, opts: ListOptions) -> Result<Page<CampaignPlan>, StoreError>;

    /// Delete plans created before `older_than` whose jobs are all finished
    /// (or which have none) and which no campaign references, together with
    /// their jobs. Returns the number of plans deleted.
    async fn delete_expired_campaign_plans(&self, older_than: Timestamp) -> Result<usize, StoreError>;

    // -- campaign jobs ------------------------------------------------------

    async fn create_campaign_job(&self, job: CampaignJob) -> Result<CampaignJob, StoreError>;
    async fn get_campaign_job(&self, id: DbId) -> Result<CampaignJob, StoreError>;
    async fn update_campaign_job(&self, job: &CampaignJob) -> Result<CampaignJob, StoreError>;
    async fn list_campaign_jobs(
        &self,
        campaign_plan_id: DbId,
        opts: ListOptions,
    ) -> Result<Page<CampaignJob>, StoreError>;

    // -- campaigns ----------------------------------------------------------

    async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign, StoreError>;
    async fn get_campaign(&self, id: DbId) -> Result<Campaign, StoreError>;
    async fn update_campaign(&self, campaign: &Campaign) -> Result<Campaign, StoreError>;
    async fn list_campaigns(&self, opts: ListOptions) -> Result<Page<Campaign>, StoreError>;

    // -- changeset jobs -----------------------------------------------------

    async fn create_changeset_job(&self, job: ChangesetJob) -> Result<ChangesetJob, StoreError>;
    async fn get_changeset_job(&self, id: DbId) -> Result<ChangesetJob, StoreError>;
    async fn update_changeset_job(&self, job: &ChangesetJob) -> Result<ChangesetJob, StoreError>;
    async fn list_changeset_jobs(
        &self,
        campaign_id: DbId,
        opts: ListOptions,
    ) -> Result<Page<ChangesetJob>, StoreError>;

    /// Atomically claim the oldest job nobody has started, stamping its
    /// `started_at`. At most one caller ever receives a given job until it
    /// is reset.
    async fn claim_next_pending_changeset_job(&self) -> Result<Option<ChangesetJob>, StoreError>;

    /// Claim job `id` if nobody has started, finished or published it yet,
    /// stamping its `started_at`. Returns `None` when another runner owns it.
    async fn claim_changeset_job(&self, id: DbId) -> Result<Option<ChangesetJob>, StoreError>;

    // -- changesets ---------------------------------------------------------

    /// Fails with `Conflict` when `(external_id, external_service_type)` is
    /// already stored.
    async fn create_changeset(&self, changeset: Changeset) -> Result<Changeset, StoreError>;
    async fn get_changeset(&self, id: DbId) -> Result<Changeset, StoreError>;
    async fn get_changeset_by_external_id(
        &self,
        external_id: &str,
        external_service_type: &str,
    ) -> Result<Option<Changeset>, StoreError>;
    async fn update_changesets(&self, changesets: &[Changeset]) -> Result<Vec<Changeset>, StoreError>;
    async fn list_changesets(&self, opts: ListOptions) -> Result<Page<Changeset>, StoreError>;

    // -- changeset events ---------------------------------------------------

    /// Every stored event of the given changesets, ordered by id.
    async fn list_changeset_events(
        &self,
        changeset_ids: &[DbId],
    ) -> Result<Vec<ChangesetEvent>, StoreError>;

    async fn get_changeset_event(
        &self,
        changeset_id: DbId,
        kind: ChangesetEventKind,
        key: &str,
    ) -> Result<Option<ChangesetEvent>, StoreError>;

    /// Insert or replace events by `(changeset_id, kind, key)`.
    ///
    /// A replaced event keeps its id and creation time; one whose metadata
    /// is unchanged is left untouched. Returns the stored rows.
    async fn upsert_changeset_events(
        &self,
        events: &[ChangesetEvent],
    ) -> Result<Vec<ChangesetEvent>, StoreError>;

    // -- repositories and code-host connections -----------------------------

    async fn get_repo(&self, id: DbId) -> Result<Repo, StoreError>;
    async fn list_repos(&self, ids: &[DbId]) -> Result<Vec<Repo>, StoreError>;
    async fn get_external_service(&self, id: DbId) -> Result<ExternalService, StoreError>;
    async fn list_external_services(
        &self,
        kind: Option<ExternalServiceKind>,
    ) -> Result<Vec<ExternalService>, StoreError>;
}

/// Finish `tx` according to `result` and hand the result back.
pub async fn finish<T, E>(tx: &dyn Store, result: Result<T, E>) -> Result<T, E> {
    tx.done(result.is_err()).await;
    result
}
