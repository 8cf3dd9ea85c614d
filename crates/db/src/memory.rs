//! In-memory [`Store`].
//!
//! All tables live behind one `tokio` mutex. A transaction takes that lock
//! for its whole lifetime and keeps a snapshot of the tables to restore on
//! rollback, so transactions are serialized against each other and against
//! plain calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use armada_core::campaign::{Campaign, CampaignJob, CampaignPlan, ChangesetJob};
use armada_core::changeset::Changeset;
use armada_core::events::{ChangesetEvent, ChangesetEventKind};
use armada_core::repo::{ExternalService, ExternalServiceKind, Repo};
use armada_core::types::{DbId, Timestamp};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::store::{ListOptions, Page, Store};

#[derive(Debug, Clone, Default)]
struct Tables {
    last_id: DbId,
    campaign_plans: BTreeMap<DbId, CampaignPlan>,
    campaign_jobs: BTreeMap<DbId, CampaignJob>,
    campaigns: BTreeMap<DbId, Campaign>,
    changeset_jobs: BTreeMap<DbId, ChangesetJob>,
    changesets: BTreeMap<DbId, Changeset>,
    changeset_events: BTreeMap<DbId, ChangesetEvent>,
    repos: BTreeMap<DbId, Repo>,
    external_services: BTreeMap<DbId, ExternalService>,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }

    fn event_id(&self, changeset_id: DbId, kind: ChangesetEventKind, key: &str) -> Option<DbId> {
        self.changeset_events
            .values()
            .find(|e| e.changeset_id == changeset_id && e.kind == kind && e.key == key)
            .map(|e| e.id)
    }
}

fn not_found(entity: &'static str, id: DbId) -> StoreError {
    StoreError::NotFound { entity, id }
}

/// Take one page of `rows` (already ordered by id) after `opts.cursor`.
fn paginate<'a, T: Clone + 'a>(
    rows: impl Iterator<Item = (&'a DbId, &'a T)>,
    opts: ListOptions,
) -> Page<T> {
    let mut items = Vec::new();
    let mut last_id = 0;
    let mut next_cursor = 0;
    for (id, row) in rows.filter(|(id, _)| **id > opts.cursor) {
        if opts.limit > 0 && items.len() == opts.limit {
            next_cursor = last_id;
            break;
        }
        last_id = *id;
        items.push(row.clone());
    }
    Page { items, next_cursor }
}

/// Replace the row `id` in `table`, stamping `updated_at`.
fn replace<T: Clone>(
    table: &mut BTreeMap<DbId, T>,
    entity: &'static str,
    id: DbId,
    mut row: T,
    stamp: impl FnOnce(&mut T, Timestamp),
) -> Result<T, StoreError> {
    let slot = table.get_mut(&id).ok_or_else(|| not_found(entity, id))?;
    stamp(&mut row, Utc::now());
    *slot = row.clone();
    Ok(row)
}

struct TxState {
    tables: OwnedMutexGuard<Tables>,
    /// Cleared on commit. Still present when the state is dropped means the
    /// transaction was abandoned and its writes are discarded.
    backup: Option<Tables>,
}

impl Drop for TxState {
    fn drop(&mut self) {
        if let Some(backup) = self.backup.take() {
            *self.tables = backup;
            tracing::debug!("Transaction dropped unfinished; rolled back");
        }
    }
}

#[derive(Clone)]
enum Handle {
    Root(Arc<Mutex<Tables>>),
    Tx {
        state: Arc<Mutex<Option<TxState>>>,
        /// Only the handle that opened the transaction may finish it.
        owner: bool,
    },
}

#[derive(Clone)]
pub struct MemoryStore {
    handle: Handle,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            handle: Handle::Root(Arc::new(Mutex::new(Tables::default()))),
        }
    }

    /// Run `f` against the tables visible to this handle.
    async fn with_tables<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<R, StoreError> + Send,
        R: Send,
    {
        match &self.handle {
            Handle::Root(tables) => {
                let mut guard = tables.lock().await;
                f(&mut *guard)
            }
            Handle::Tx { state, .. } => {
                let mut guard = state.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                f(&mut *tx.tables)
            }
        }
    }

    /// Register a repository. Repositories are owned by the code-host
    /// mirroring layer; this is how it hands them over.
    pub async fn insert_repo(&self, repo: Repo) -> Result<Repo, StoreError> {
        self.with_tables(move |t| {
            let mut repo = repo;
            if repo.id == 0 {
                repo.id = t.next_id();
            } else {
                t.last_id = t.last_id.max(repo.id);
            }
            t.repos.insert(repo.id, repo.clone());
            Ok(repo)
        })
        .await
    }

    /// Register a code-host connection.
    pub async fn insert_external_service(
        &self,
        service: ExternalService,
    ) -> Result<ExternalService, StoreError> {
        self.with_tables(move |t| {
            let mut service = service;
            if service.id == 0 {
                service.id = t.next_id();
            } else {
                t.last_id = t.last_id.max(service.id);
            }
            t.external_services.insert(service.id, service.clone());
            Ok(service)
        })
        .await
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn transact(&self) -> Result<Arc<dyn Store>, StoreError> {
        let state = match &self.handle {
            Handle::Root(tables) => {
                let guard = Arc::clone(tables).lock_owned().await;
                let backup = (*guard).clone();
                return Ok(Arc::new(MemoryStore {
                    handle: Handle::Tx {
                        state: Arc::new(Mutex::new(Some(TxState {
                            tables: guard,
                            backup: Some(backup),
                        }))),
                        owner: true,
                    },
                }));
            }
            Handle::Tx { state, .. } => Arc::clone(state),
        };
        Ok(Arc::new(MemoryStore {
            handle: Handle::Tx {
                state,
                owner: false,
            },
        }))
    }

    async fn done(&self, failed: bool) {
        let Handle::Tx { state, owner: true } = &self.handle else {
            return;
        };
        let Some(mut tx) = state.lock().await.take() else {
            return;
        };
        let backup = tx.backup.take();
        if failed {
            if let Some(backup) = backup {
                *tx.tables = backup;
            }
            tracing::debug!("Transaction rolled back");
        }
    }

    // -- campaign plans -----------------------------------------------------

    async fn create_campaign_plan(&self, plan: CampaignPlan) -> Result<CampaignPlan, StoreError> {
        self.with_tables(move |t| {
            let now = Utc::now();
            let plan = CampaignPlan {
                id: t.next_id(),
                created_at: now,
                updated_at: now,
                ..plan
            };
            t.campaign_plans.insert(plan.id, plan.clone());
            Ok(plan)
        })
        .await
    }

    async fn get_campaign_plan(&self, id: DbId) -> Result<CampaignPlan, StoreError> {
        self.with_tables(move |t| {
            t.campaign_plans
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("campaign plan", id))
        })
        .await
    }

    async fn update_campaign_plan(&self, plan: &CampaignPlan) -> Result<CampaignPlan, StoreError> {
        self.with_tables(move |t| {
            replace(&mut t.campaign_plans, "campaign plan", plan.id, plan.clone(), |p, now| {
                p.updated_at = now
            })
        })
        .await
    }

    async fn delete_campaign_plan(&self, id: DbId) -> Result<(), StoreError> {
        self.with_tables(move |t| {
            t.campaign_plans
                .remove(&id)
                .ok_or_else(|| not_found("campaign plan", id))?;
            t.campaign_jobs.retain(|_, job| job.campaign_plan_id != id);
            Ok(())
        })
        .await
    }

    async fn list_campaign_plans(&self, opts: ListOptions) -> Result<Page<CampaignPlan>, StoreError> {
        self.with_tables(move |t| Ok(paginate(t.campaign_plans.iter(), opts)))
            .await
    }

    async fn delete_expired_campaign_plans(&self, older_than: Timestamp) -> Result<usize, StoreError> {
        self.with_tables(move |t| {
            let expired: Vec<DbId> = t
                .campaign_plans
                .values()
                .filter(|plan| plan.created_at < older_than)
                .filter(|plan| {
                    !t.campaigns
                        .values()
                        .any(|c| c.campaign_plan_id == Some(plan.id))
                })
                .filter(|plan| {
                    t.campaign_jobs
                        .values()
                        .filter(|job| job.campaign_plan_id == plan.id)
                        .all(CampaignJob::is_finished)
                })
                .map(|plan| plan.id)
                .collect();

            for id in &expired {
                t.campaign_plans.remove(id);
            }
            t.campaign_jobs
                .retain(|_, job| !expired.contains(&job.campaign_plan_id));
            Ok(expired.len())
        })
        .await
    }

    // -- campaign jobs ------------------------------------------------------

    async fn create_campaign_job(&self, job: CampaignJob) -> Result<CampaignJob, StoreError> {
        self.with_tables(move |t| {
            if !t.campaign_plans.contains_key(&job.campaign_plan_id) {
                return Err(not_found("campaign plan", job.campaign_plan_id));
            }
            let now = Utc::now();
            let job = CampaignJob {
                id: t.next_id(),
                created_at: now,
                updated_at: now,
                ..job
            };
            t.campaign_jobs.insert(job.id, job.clone());
            Ok(job)
        })
        .await
    }

    async fn get_campaign_job(&self, id: DbId) -> Result<CampaignJob, StoreError> {
        self.with_tables(move |t| {
            t.campaign_jobs
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("campaign job", id))
        })
        .await
    }

    async fn update_campaign_job(&self, job: &CampaignJob) -> Result<CampaignJob, StoreError> {
        self.with_tables(move |t| {
            replace(&mut t.campaign_jobs, "campaign job", job.id, job.clone(), |j, now| {
                j.updated_at = now
            })
        })
        .await
    }

    async fn list_campaign_jobs(
        &self,
        campaign_plan_id: DbId,
        opts: ListOptions,
    ) -> Result<Page<CampaignJob>, StoreError> {
        self.with_tables(move |t| {
            Ok(paginate(
                t.campaign_jobs
                    .iter()
                    .filter(|(_, job)| job.campaign_plan_id == campaign_plan_id),
                opts,
            ))
        })
        .await
    }

    // -- campaigns ----------------------------------------------------------

    async fn create_campaign(&self, campaign: Campaign) -> Result<Campaign, StoreError> {
        self.with_tables(move |t| {
            let now = Utc::now();
            let campaign = Campaign {
                id: t.next_id(),
                created_at: now,
                updated_at: now,
                ..campaign
            };
            t.campaigns.insert(campaign.id, campaign.clone());
            Ok(campaign)
        })
        .await
    }

    async fn get_campaign(&self, id: DbId) -> Result<Campaign, StoreError> {
        self.with_tables(move |t| {
            t.campaigns
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("campaign", id))
        })
        .await
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<Campaign, StoreError> {
        self.with_tables(move |t| {
            replace(&mut t.campaigns, "campaign", campaign.id, campaign.clone(), |c, now| {
                c.updated_at = now
            })
        })
        .await
    }

    async fn list_campaigns(&self, opts: ListOptions) -> Result<Page<Campaign>, StoreError> {
        self.with_tables(move |t| Ok(paginate(t.campaigns.iter(), opts)))
            .await
    }

    // -- changeset jobs -----------------------------------------------------

    async fn create_changeset_job(&self, job: ChangesetJob) -> Result<ChangesetJob, StoreError> {
        self.with_tables(move |t| {
            if !t.campaigns.contains_key(&job.campaign_id) {
                return Err(not_found("campaign", job.campaign_id));
            }
            let now = Utc::now();
            let job = ChangesetJob {
                id: t.next_id(),
                created_at: now,
                updated_at: now,
                ..job
            };
            t.changeset_jobs.insert(job.id, job.clone());
            Ok(job)
        })
        .await
    }

    async fn get_changeset_job(&self, id: DbId) -> Result<ChangesetJob, StoreError> {
        self.with_tables(move |t| {
            t.changeset_jobs
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("changeset job", id))
        })
        .await
    }

    async fn update_changeset_job(&self, job: &ChangesetJob) -> Result<ChangesetJob, StoreError> {
        self.with_tables(move |t| {
            replace(&mut t.changeset_jobs, "changeset job", job.id, job.clone(), |j, now| {
                j.updated_at = now
            })
        })
        .await
    }

    async fn list_changeset_jobs(
        &self,
        campaign_id: DbId,
        opts: ListOptions,
    ) -> Result<Page<ChangesetJob>, StoreError> {
        self.with_tables(move |t| {
            Ok(paginate(
                t.changeset_jobs
                    .iter()
                    .filter(|(_, job)| job.campaign_id == campaign_id),
                opts,
            ))
        })
        .await
    }

    async fn claim_next_pending_changeset_job(&self) -> Result<Option<ChangesetJob>, StoreError> {
        self.with_tables(|t| {
            let Some(job) = t
                .changeset_jobs
                .values_mut()
                .find(|job| {
                    job.started_at.is_none() && job.finished_at.is_none() && job.changeset_id == 0
                })
            else {
                return Ok(None);
            };
            let now = Utc::now();
            job.started_at = Some(now);
            job.updated_at = now;
            Ok(Some(job.clone()))
        })
        .await
    }

    async fn claim_changeset_job(&self, id: DbId) -> Result<Option<ChangesetJob>, StoreError> {
        self.with_tables(move |t| {
            let job = t
                .changeset_jobs
                .get_mut(&id)
                .ok_or_else(|| not_found("changeset job", id))?;
            if job.started_at.is_some() || job.finished_at.is_some() || job.changeset_id != 0 {
                return Ok(None);
            }
            let now = Utc::now();
            job.started_at = Some(now);
            job.updated_at = now;
            Ok(Some(job.clone()))
        })
        .await
    }

    // -- changesets ---------------------------------------------------------

    async fn create_changeset(&self, changeset: Changeset) -> Result<Changeset, StoreError> {
        self.with_tables(move |t| {
            let duplicate = t.changesets.values().any(|c| {
                c.external_id == changeset.external_id
                    && c.external_service_type == changeset.external_service_type
            });
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "changeset {} on {} already exists",
                    changeset.external_id, changeset.external_service_type
                )));
            }
            let now = Utc::now();
            let changeset = Changeset {
                id: t.next_id(),
                created_at: now,
                updated_at: now,
                ..changeset
            };
            t.changesets.insert(changeset.id, changeset.clone());
            Ok(changeset)
        })
        .await
    }

    async fn get_changeset(&self, id: DbId) -> Result<Changeset, StoreError> {
        self.with_tables(move |t| {
            t.changesets
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("changeset", id))
        })
        .await
    }

    async fn get_changeset_by_external_id(
        &self,
        external_id: &str,
        external_service_type: &str,
    ) -> Result<Option<Changeset>, StoreError> {
        self.with_tables(move |t| {
            Ok(t
                .changesets
                .values()
                .find(|c| {
                    c.external_id == external_id
                        && c.external_service_type == external_service_type
                })
                .cloned())
        })
        .await
    }

    async fn update_changesets(&self, changesets: &[Changeset]) -> Result<Vec<Changeset>, StoreError> {
        self.with_tables(move |t| {
            changesets
                .iter()
                .map(|cs| {
                    replace(&mut t.changesets, "changeset", cs.id, cs.clone(), |c, now| {
                        c.updated_at = now
                    })
                })
                .collect()
        })
        .await
    }

    async fn list_changesets(&self, opts: ListOptions) -> Result<Page<Changeset>, StoreError> {
        self.with_tables(move |t| Ok(paginate(t.changesets.iter(), opts)))
            .await
    }

    // -- changeset events ---------------------------------------------------

    async fn list_changeset_events(
        &self,
        changeset_ids: &[DbId],
    ) -> Result<Vec<ChangesetEvent>, StoreError> {
        self.with_tables(move |t| {
            Ok(t
                .changeset_events
                .values()
                .filter(|e| changeset_ids.contains(&e.changeset_id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_changeset_event(
        &self,
        changeset_id: DbId,
        kind: ChangesetEventKind,
        key: &str,
    ) -> Result<Option<ChangesetEvent>, StoreError> {
        self.with_tables(move |t| {
            Ok(t
                .event_id(changeset_id, kind, key)
                .and_then(|id| t.changeset_events.get(&id))
                .cloned())
        })
        .await
    }

    async fn upsert_changeset_events(
        &self,
        events: &[ChangesetEvent],
    ) -> Result<Vec<ChangesetEvent>, StoreError> {
        self.with_tables(move |t| {
            let mut stored = Vec::with_capacity(events.len());
            // Later duplicates within one batch land on the row the first
            // one created.
            let mut batch: HashMap<(DbId, ChangesetEventKind, String), DbId> = HashMap::new();
            let now = Utc::now();

            for event in events {
                let identity = (event.changeset_id, event.kind, event.key.clone());
                let existing = batch
                    .get(&identity)
                    .copied()
                    .or_else(|| t.event_id(event.changeset_id, event.kind, &event.key));

                let row = match existing.and_then(|id| t.changeset_events.get_mut(&id)) {
                    Some(row) => {
                        if row.metadata != event.metadata {
                            row.metadata = event.metadata.clone();
                            row.updated_at = now;
                        }
                        row.clone()
                    }
                    None => {
                        let row = ChangesetEvent {
                            id: t.next_id(),
                            created_at: now,
                            updated_at: now,
                            ..event.clone()
                        };
                        t.changeset_events.insert(row.id, row.clone());
                        row
                    }
                };
                batch.insert(identity, row.id);
                stored.push(row);
            }
            Ok(stored)
        })
        .await
    }

    // -- repositories and code-host connections -----------------------------

    async fn get_repo(&self, id: DbId) -> Result<Repo, StoreError> {
        self.with_tables(move |t| t.repos.get(&id).cloned().ok_or_else(|| not_found("repo", id)))
            .await
    }

    async fn list_repos(&self, ids: &[DbId]) -> Result<Vec<Repo>, StoreError> {
        self.with_tables(move |t| {
            Ok(ids
                .iter()
                .filter_map(|id| t.repos.get(id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn get_external_service(&self, id: DbId) -> Result<ExternalService, StoreError> {
        self.with_tables(move |t| {
            t.external_services
                .get(&id)
                .cloned()
                .ok_or_else(|| not_found("external service", id))
        })
        .await
    }

    async fn list_external_services(
        &self,
        kind: Option<ExternalServiceKind>,
    ) -> Result<Vec<ExternalService>, StoreError> {
        self.with_tables(move |t| {
            Ok(t
                .external_services
                .values()
                .filter(|svc| kind.map_or(true, |k| svc.kind == k))
                .cloned()
                .collect())
        })
        .await
    }
}
