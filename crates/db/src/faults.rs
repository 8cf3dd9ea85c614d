//! A [`Store`] wrapper that fails chosen operations on demand.
//!
//! Enabled with the `testing` feature so services can exercise their
//! store-failure paths against the in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use armada_core::campaign::{Campaign, CampaignJob, CampaignPlan, ChangesetJob};
use armada_core::changeset::Changeset;
use armada_core::events::{ChangesetEvent, ChangesetEventKind};
use armada_core::repo::{ExternalService, ExternalServiceKind, Repo};
use armada_core::types::{DbId, Timestamp};
use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{ListOptions, Page, Store};

#[derive(Debug, Clone, Copy)]
struct Rule {
    skip: usize,
    fail: usize,
}

#[derive(Debug, Default)]
struct Faults {
    rules: Mutex<HashMap<&'static str, Rule>>,
}

impl Faults {
    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let Some(rule) = rules.get_mut(op) else {
            return Ok(());
        };
        if rule.skip > 0 {
            rule.skip -= 1;
            return Ok(());
        }
        if rule.fail == 0 {
            return Ok(());
        }
        rule.fail -= 1;
        tracing::debug!(op, "Injected store failure");
        Err(StoreError::Conflict(format!("injected failure in {op}")))
    }
}

/// Delegates every call to an inner store unless a fault is armed for it.
///
/// Transactions opened through a `FaultyStore` share its faults, so a rule
/// armed on the root handle also fires inside transactions.
#[derive(Clone)]
pub struct FaultyStore {
    inner: Arc<dyn Store>,
    faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    /// Fail the next `times` calls of `op`.
    pub fn fail(&self, op: &'static str, times: usize) {
        self.fail_after(op, 0, times);
    }

    /// Let `skip` calls of `op` through, then fail the next `times`.
    pub fn fail_after(&self, op: &'static str, skip: usize, times: usize) {
        self.faults
            .rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op, Rule { skip, fail: times });
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn transact(&self) -> Result<Arc<dyn Store>, StoreError> {
        self.faults.check("transact")?;
        let inner = self.inner.transact().await?;
        Ok(Arc::new(FaultyStore {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }

    async fn done(&self, failed: bool) {
        self.inner.done(failed).await
    }

    async fn create_campaign_plan(&self, plan: CampaignPlan) -> Result<CampaignPlan, StoreError> {
        self.faults.check("create_campaign_plan")?;
        self.inner.create_campaign_plan(plan).await
    }

    async fn get_campaign_plan(&self, id: DbId) -> Result<CampaignPlan, StoreError> {
        self.faults.check("get_campaign_plan")?;
        self.inner.get_campaign_plan(id).await
    }

    async fn update_campaign_plan(&self, plan: &CampaignPlan) -> Result<CampaignPlan, StoreError> {
        self.faults.check("update_campaign_plan")?;
        self.inner.update_campaign_plan(plan).await
    }

    async fn delete_campaign_plan(&self, id: DbId) -> Result<(), StoreError> {
        self.faults.check("delete_campaign_plan")?;
        self.inner.delete_campaign_plan(id).await
    }

    async fn list_campaign_plans(&self, opts: ListOptions) -> Result<Page<CampaignPlan>, StoreError> {
        self.faults.check("list_campaign_plans")?;
        self.inner.list_campaign_plans(opts).await
    }

    async fn delete_expired_campaign_plans(&self, older_than: Timestamp) -> Result<usize, StoreError> {
        self.faults.check("delete_expired_campaign_plans")?;
        self.inner.delete_expired_campaign_plans(older_than).await
    }

    async fn create_campaign_job(&self, job: CampaignJob) -> Result<CampaignJob, StoreError> {
        self.faults.check("create_campaign_job")?;
        self.inner.create_campaign_job(job).await
    }

    async fn get_campaign_job(&self, id: DbId) -> Result<CampaignJob, StoreError> {
        self.faults.check("get_campaign_job")?;
        self.inner.get_campaign_job(id).await
    }

    async fn update_campaign_job(&self, job: &CampaignJob) -> Result<CampaignJob, StoreError> {
        self.faults.check("update_campaign_job")?;
        self.inner.update_campaign_job(job).await
    }

    async fn list_campaign_jobs(
        &self,
        campaign_plan_id: DbId,
        opts: ListOptions,
    ) -> Result<Page<CampaignJob>, StoreError> {
        self.faults.check("list_campaign_jobs")?;
        self.inner.list_campaign_jobs(campaign_plan_id, opts).await
    }

    async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign, StoreError> {
        self.faults.check("create_campaign")?;
        self.inner.create_campaign(campaign).await
    }

    async fn get_campaign(&self, id: DbId) -> Result<Campaign, StoreError> {
        self.faults.check("get_campaign")?;
        self.inner.get_campaign(id).await
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<Campaign, StoreError> {
        self.faults.check("update_campaign")?;
        self.inner.update_campaign(campaign).await
    }

    async fn list_campaigns(&self, opts: ListOptions) -> Result<Page<Campaign>, StoreError> {
        self.faults.check("list_campaigns")?;
        self.inner.list_campaigns(opts).await
    }

    async fn create_changeset_job(&self, job: ChangesetJob) -> Result<ChangesetJob, StoreError> {
        self.faults.check("create_changeset_job")?;
        self.inner.create_changeset_job(job).await
    }

    async fn get_changeset_job(&self, id: DbId) -> Result<ChangesetJob, StoreError> {
        self.faults.check("get_changeset_job")?;
        self.inner.get_changeset_job(id).await
    }

    async fn update_changeset_job(&self, job: &ChangesetJob) -> Result<ChangesetJob, StoreError> {
        self.faults.check("update_changeset_job")?;
        self.inner.update_changeset_job(job).await
    }

    async fn list_changeset_jobs(
        &self,
        campaign_id: DbId,
        opts: ListOptions,
    ) -> Result<Page<ChangesetJob>, StoreError> {
        self.faults.check("list_changeset_jobs")?;
        self.inner.list_changeset_jobs(campaign_id, opts).await
    }

    async fn claim_next_pending_changeset_job(&self) -> Result<Option<ChangesetJob>, StoreError> {
        self.faults.check("claim_next_pending_changeset_job")?;
        self.inner.claim_next_pending_changeset_job().await
    }

    async fn claim_changeset_job(&self, id: DbId) -> Result<Option<ChangesetJob>, StoreError> {
        self.faults.check("claim_changeset_job")?;
        self.inner.claim_changeset_job(id).await
    }

    async fn create_changeset(&self, changeset: Changeset) -> Result<Changeset, StoreError> {
        self.faults.check("create_changeset")?;
        self.inner.create_changeset(changeset).await
    }

    async fn get_changeset(&self, id: DbId) -> Result<Changeset, StoreError> {
        self.faults.check("get_changeset")?;
        self.inner.get_changeset(id).await
    }

    async fn get_changeset_by_external_id(
        &self,
        external_id: &str,
        external_service_type: &str,
    ) -> Result<Option<Changeset>, StoreError> {
        self.faults.check("get_changeset_by_external_id")?;
        self.inner
            .get_changeset_by_external_id(external_id, external_service_type)
            .await
    }

    async fn update_changesets(&self, changesets: &[Changeset]) -> Result<Vec<Changeset>, StoreError> {
        self.faults.check("update_changesets")?;
        self.inner.update_changesets(changesets).await
    }

    async fn list_changesets(&self, opts: ListOptions) -> Result<Page<Changeset>, StoreError> {
        self.faults.check("list_changesets")?;
        self.inner.list_changesets(opts).await
    }

    async fn list_changeset_events(
        &self,
        changeset_ids: &[DbId],
    ) -> Result<Vec<ChangesetEvent>, StoreError> {
        self.faults.check("list_changeset_events")?;
        self.inner.list_changeset_events(changeset_ids).await
    }

    async fn get_changeset_event(
        &self,
        changeset_id: DbId,
        kind: ChangesetEventKind,
        key: &str,
    ) -> Result<Option<ChangesetEvent>, StoreError> {
        self.faults.check("get_changeset_event")?;
        self.inner.get_changeset_event(changeset_id, kind, key).await
    }

    async fn upsert_changeset_events(
        &self,
        events: &[ChangesetEvent],
    ) -> Result<Vec<ChangesetEvent>, StoreError> {
        self.faults.check("upsert_changeset_events")?;
        self.inner.upsert_changeset_events(events).await
    }

    async fn get_repo(&self, id: DbId) -> Result<Repo, StoreError> {
        self.faults.check("get_repo")?;
        self.inner.get_repo(id).await
    }

    async fn list_repos(&self, ids: &[DbId]) -> Result<Vec<Repo>, StoreError> {
        self.faults.check("list_repos")?;
        self.inner.list_repos(ids).await
    }

    async fn get_external_service(&self, id: DbId) -> Result<ExternalService, StoreError> {
        self.faults.check("get_external_service")?;
        self.inner.get_external_service(id).await
    }

    async fn list_external_services(
        &self,
        kind: Option<ExternalServiceKind>,
    ) -> Result<Vec<ExternalService>, StoreError> {
        self.faults.check("list_external_services")?;
        self.inner.list_external_services(kind).await
    }
}
