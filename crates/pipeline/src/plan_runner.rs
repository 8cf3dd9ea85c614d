//! Plan execution.
//!
//! [`PlanRunner::run`] turns `(campaign type, arguments)` into a persisted
//! [`CampaignPlan`] with one [`CampaignJob`] per repository, then generates
//! the diffs concurrently in the background. A repository's failure is
//! recorded on its job and never fails the run or its siblings.
//!
//! Lifecycle of a plan: `Created -> Processing -> Completed | Errored |
//! Canceled`, as reported by [`plan_status`].

use std::sync::Arc;
use std::time::Duration;

use armada_core::campaign::{CampaignJob, CampaignPlan};
use armada_core::repo::Repo;
use armada_core::status::BackgroundProcessStatus;
use armada_core::types::DbId;
use armada_db::{finish, ListOptions, Store, StoreError};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::campaign_types::{CampaignType, CampaignTypeError, CampaignTypes};
use crate::capabilities::{BoxError, DefaultBranchResolver, RepoSearch, ResolveError, ResolvedRevision};
use crate::config::PipelineConfig;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    CampaignType(#[from] CampaignTypeError),

    #[error("repository search failed: {0}")]
    Search(BoxError),

    #[error("search returned {found} repositories, more than the maximum of {max}")]
    TooManyResults { found: usize, max: usize },

    #[error("resolving default branch of {repo} failed: {source}")]
    ResolveRevision {
        repo: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A diff task panicked or could not run.
    #[error("diff task failed: {0}")]
    Task(String),
}

/// When [`PlanRunner::run`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// As soon as the jobs are persisted.
    #[default]
    Background,
    /// After every diff task has finished.
    Synchronous,
}

pub struct PlanRunner {
    store: Arc<dyn Store>,
    search: Arc<dyn RepoSearch>,
    resolver: Arc<dyn DefaultBranchResolver>,
    campaign_types: Arc<dyn CampaignTypes>,
    config: PipelineConfig,
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<Result<(), PlanError>>>,
}

impl PlanRunner {
    pub fn new(
        store: Arc<dyn Store>,
        search: Arc<dyn RepoSearch>,
        resolver: Arc<dyn DefaultBranchResolver>,
        campaign_types: Arc<dyn CampaignTypes>,
        config: PipelineConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.diff_concurrency.max(1)));
        Self {
            store,
            search,
            resolver,
            campaign_types,
            config,
            semaphore,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Create a plan and start generating its diffs.
    ///
    /// Argument validation, search, the result cap and branch resolution
    /// all happen before anything is persisted, so a run that fails here
    /// leaves nothing behind.
    pub async fn run(
        &self,
        campaign_type: &str,
        arguments: Value,
        completion: Completion,
    ) -> Result<CampaignPlan, PlanError> {
        let generator = self.campaign_types.build(campaign_type, &arguments)?;

        let query = generator.search_query();
        let repos = self.search.search(&query).await.map_err(PlanError::Search)?;
        if repos.len() > self.config.max_repositories {
            return Err(PlanError::TooManyResults {
                found: repos.len(),
                max: self.config.max_repositories,
            });
        }

        let targets = self.resolve_targets(repos).await?;

        let tx = self.store.transact().await?;
        let (plan, jobs) = finish(
            tx.as_ref(),
            persist_plan(tx.as_ref(), campaign_type, arguments, &targets).await,
        )
        .await?;

        tracing::info!(
            plan_id = plan.id,
            campaign_type = %plan.campaign_type,
            jobs = jobs.len(),
            "Campaign plan created"
        );

        {
            let mut tasks = self.tasks.lock().await;
            for (job, (repo, _)) in jobs.into_iter().zip(targets) {
                tasks.spawn(run_job(
                    Arc::clone(&self.store),
                    Arc::clone(&generator),
                    Arc::clone(&self.semaphore),
                    repo,
                    job,
                    self.config.diff_fetch_timeout,
                ));
            }
        }

        if completion == Completion::Synchronous {
            self.wait().await?;
        }
        Ok(plan)
    }

    /// Wait for every diff task started by runs not yet waited on.
    ///
    /// Returns the first task failure. A job that recorded an error is not
    /// a task failure.
    pub async fn wait(&self) -> Result<(), PlanError> {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(PlanError::Task(e.to_string())));
            if let Err(e) = outcome {
                tracing::error!(error = %e, "Diff task failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Resolve the default branch of every repository, skipping those
    /// without one.
    async fn resolve_targets(
        &self,
        repos: Vec<Repo>,
    ) -> Result<Vec<(Repo, ResolvedRevision)>, PlanError> {
        let mut targets = Vec::with_capacity(repos.len());
        for repo in repos {
            match self.resolver.resolve(&repo).await {
                Ok(rev) => targets.push((repo, rev)),
                Err(ResolveError::NoDefaultBranch(_)) => {
                    tracing::debug!(repo = %repo.name, "Skipping repository without default branch");
                }
                Err(ResolveError::Other(source)) => {
                    return Err(PlanError::ResolveRevision {
                        repo: repo.name,
                        source,
                    });
                }
            }
        }
        Ok(targets)
    }
}

async fn persist_plan(
    tx: &dyn Store,
    campaign_type: &str,
    arguments: Value,
    targets: &[(Repo, ResolvedRevision)],
) -> Result<(CampaignPlan, Vec<CampaignJob>), PlanError> {
    let now = Utc::now();
    let plan = tx
        .create_campaign_plan(CampaignPlan {
            id: 0,
            campaign_type: campaign_type.trim().to_ascii_lowercase(),
            arguments,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let mut jobs = Vec::with_capacity(targets.len());
    for (repo, rev) in targets {
        let job = tx
            .create_campaign_job(CampaignJob {
                id: 0,
                campaign_plan_id: plan.id,
                repo_id: repo.id,
                rev: rev.commit_id.clone(),
                base_ref: rev.ref_name.clone(),
                diff: String::new(),
                description: String::new(),
                error: String::new(),
                started_at: None,
                finished_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        jobs.push(job);
    }
    Ok((plan, jobs))
}

/// Generate and record the diff of one job.
async fn run_job(
    store: Arc<dyn Store>,
    generator: Arc<dyn CampaignType>,
    semaphore: Arc<Semaphore>,
    repo: Repo,
    mut job: CampaignJob,
    timeout: Duration,
) -> Result<(), PlanError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| PlanError::Task(e.to_string()))?;

    job.started_at = Some(Utc::now());
    job = store.update_campaign_job(&job).await?;

    match tokio::time::timeout(timeout, generator.generate_diff(&repo, &job.rev)).await {
        Ok(Ok(generated)) => {
            job.diff = generated.diff;
            job.description = generated.description;
        }
        Ok(Err(e)) => {
            tracing::error!(job_id = job.id, repo = %repo.name, error = %e, "Generating diff failed");
            job.error = e.to_string();
        }
        Err(_) => {
            tracing::error!(job_id = job.id, repo = %repo.name, "Generating diff timed out");
            job.error = format!("generating diff timed out after {timeout:?}");
        }
    }

    job.finished_at = Some(Utc::now());
    store.update_campaign_job(&job).await?;
    Ok(())
}

/// Mark a plan canceled. Running diff tasks are not interrupted; the plan
/// reports `Canceled` from now on.
pub async fn cancel_plan(store: &dyn Store, plan_id: DbId) -> Result<CampaignPlan, StoreError> {
    let mut plan = store.get_campaign_plan(plan_id).await?;
    if plan.canceled_at.is_some() {
        return Ok(plan);
    }
    plan.canceled_at = Some(Utc::now());
    let plan = store.update_campaign_plan(&plan).await?;
    tracing::info!(plan_id, "Campaign plan canceled");
    Ok(plan)
}

/// Aggregate progress of a plan's jobs.
pub async fn plan_status(
    store: &dyn Store,
    plan_id: DbId,
) -> Result<BackgroundProcessStatus, StoreError> {
    let plan = store.get_campaign_plan(plan_id).await?;
    let jobs = store
        .list_campaign_jobs(plan_id, ListOptions::all())
        .await?
        .items;
    Ok(BackgroundProcessStatus::from_jobs(&jobs, plan.canceled_at))
}

/// Delete plans past `retention` that nothing depends on any more.
pub async fn delete_expired_plans(
    store: &dyn Store,
    retention: chrono::Duration,
) -> Result<usize, StoreError> {
    let deleted = store
        .delete_expired_campaign_plans(Utc::now() - retention)
        .await?;
    if deleted > 0 {
        tracing::info!(deleted, "Expired campaign plans deleted");
    } else {
        tracing::debug!("No expired campaign plans");
    }
    Ok(deleted)
}
