//! Changeset publication.
//!
//! A [`ChangesetJob`] pushes the diff of one accepted [`CampaignJob`] to a
//! campaign branch and opens a changeset for it on the code host. Every
//! failure is recorded on the job itself; a batch never stops at its first
//! failing job and never undoes the jobs that succeeded.
//!
//! [`CampaignJob`]: armada_core::campaign::CampaignJob

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use armada_core::campaign::{Campaign, ChangesetJob};
use armada_core::changeset::Changeset;
use armada_core::error::MultiError;
use armada_core::repo::{first_credentialed, ExternalService, Repo};
use armada_core::types::DbId;
use armada_db::{finish, ListOptions, Store, StoreError};
use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::capabilities::{
    BoxError, CommitInfo, CreateCommitFromPatchRequest, CreatedChangeset, GitClient, NewChangeset,
    SourceFactory,
};

/// Base ref used when the campaign job recorded none.
pub const DEFAULT_BASE_REF: &str = "refs/heads/master";

/// Jobs of one batch published at the same time.
const BATCH_CONCURRENCY: usize = 8;

/// Delays between attempts to record a job's outcome.
const RECORD_RETRY_DELAYS_MS: [u64; 2] = [50, 200];

const COMMIT_AUTHOR_NAME: &str = "Armada";
const COMMIT_AUTHOR_EMAIL: &str = "campaigns@armada.invalid";

/// Branch every changeset of a campaign is pushed to.
pub fn branch_name(campaign_id: DbId) -> String {
    format!("armada/campaign-{campaign_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("campaign job {0} has no diff to publish")]
    EmptyDiff(DbId),

    #[error("no credentialed code-host connection for repository {0}")]
    NoCredentials(String),

    #[error("pushing commit failed: {0}")]
    Git(BoxError),

    #[error("creating changeset failed: {0}")]
    Source(BoxError),
}

pub struct Publisher {
    store: Arc<dyn Store>,
    git: Arc<dyn GitClient>,
    sources: Arc<dyn SourceFactory>,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn Store>,
        git: Arc<dyn GitClient>,
        sources: Arc<dyn SourceFactory>,
    ) -> Self {
        Self { store, git, sources }
    }

    /// Publish one job and record the outcome on it.
    ///
    /// `job` is either unstarted, in which case it is claimed here, or was
    /// claimed by the caller and still carries the stored `started_at`.
    /// Anything else is owned by another runner or already done; the stored
    /// row is returned untouched.
    ///
    /// Only a failure to record the outcome is returned as an error; a
    /// publication failure ends up in the returned job's `error`.
    pub async fn run_changeset_job(&self, job: ChangesetJob) -> Result<ChangesetJob, StoreError> {
        let Some(mut job) = self.take_ownership(&job).await? else {
            tracing::debug!(changeset_job_id = job.id, "Changeset job taken or already done");
            return self.store.get_changeset_job(job.id).await;
        };
        job.error.clear();

        if let Err(e) = self.publish(&mut job).await {
            tracing::error!(changeset_job_id = job.id, error = %e, "Publishing changeset failed");
            job.error = e.to_string();
        }

        job.finished_at = Some(Utc::now());
        self.record(&job).await
    }

    /// The stored row of `job` if this caller may run it.
    async fn take_ownership(&self, job: &ChangesetJob) -> Result<Option<ChangesetJob>, StoreError> {
        let stored = self.store.get_changeset_job(job.id).await?;
        if stored.is_published() || stored.is_finished() {
            return Ok(None);
        }
        match job.started_at {
            None => self.store.claim_changeset_job(job.id).await,
            Some(started_at) if stored.started_at == Some(started_at) => Ok(Some(stored)),
            Some(_) => Ok(None),
        }
    }

    /// Write the finished job, retrying store errors with backoff.
    async fn record(&self, job: &ChangesetJob) -> Result<ChangesetJob, StoreError> {
        for (attempt, delay_ms) in RECORD_RETRY_DELAYS_MS.iter().enumerate() {
            match self.store.update_changeset_job(job).await {
                Ok(stored) => return Ok(stored),
                Err(e) => {
                    tracing::warn!(
                        changeset_job_id = job.id,
                        attempt = attempt + 1,
                        error = %e,
                        "Recording changeset job failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
            }
        }

        self.store.update_changeset_job(job).await.map_err(|e| {
            tracing::error!(
                changeset_job_id = job.id,
                changeset_id = job.changeset_id,
                error = %e,
                "Recording changeset job failed after all retries"
            );
            e
        })
    }

    /// Publish every pending job of a campaign.
    ///
    /// All jobs are attempted; their failures are returned together. A job
    /// another runner claimed first is skipped.
    pub async fn run_changeset_jobs(&self, campaign_id: DbId) -> Result<(), MultiError> {
        let jobs = match self
            .store
            .list_changeset_jobs(campaign_id, ListOptions::all())
            .await
        {
            Ok(page) => page.items,
            Err(e) => return Err(std::iter::once(e.to_string()).collect()),
        };

        let outcomes: Vec<Result<Option<ChangesetJob>, StoreError>> = stream::iter(
            jobs.into_iter().filter(|job| {
                job.started_at.is_none() && !job.is_published() && !job.is_finished()
            }),
        )
        .map(|job| async move {
            let Some(claimed) = self.store.claim_changeset_job(job.id).await? else {
                tracing::debug!(changeset_job_id = job.id, "Changeset job claimed elsewhere");
                return Ok(None);
            };
            self.run_changeset_job(claimed).await.map(Some)
        })
        .buffer_unordered(BATCH_CONCURRENCY)
        .collect()
        .await;

        let mut errors = MultiError::new();
        for outcome in outcomes {
            match outcome {
                Ok(Some(job)) if !job.error.is_empty() => {
                    errors.push(format!("changeset job {}: {}", job.id, job.error))
                }
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
        errors.into_result()
    }

    async fn publish(&self, job: &mut ChangesetJob) -> Result<(), PublishError> {
        let campaign = self.store.get_campaign(job.campaign_id).await?;
        let campaign_job = self.store.get_campaign_job(job.campaign_job_id).await?;
        if campaign_job.diff.is_empty() {
            return Err(PublishError::EmptyDiff(campaign_job.id));
        }
        let repo = self.store.get_repo(campaign_job.repo_id).await?;

        let mut patch = campaign_job.diff.clone();
        if !patch.ends_with('\n') {
            patch.push('\n');
        }
        let head_ref = self
            .git
            .create_commit_from_patch(CreateCommitFromPatchRequest {
                repo: repo.name.clone(),
                base_commit: campaign_job.rev.clone(),
                patch,
                target_ref: format!("refs/heads/{}", branch_name(campaign.id)),
                commit_info: commit_info(&campaign),
                // Diffs carry no a/ and b/ prefixes.
                git_apply_args: vec!["-p0".to_string()],
                push: true,
            })
            .await
            .map_err(PublishError::Git)?;

        let service = self.credentialed_service(&repo).await?;
        let source = self.sources.source_for(&service).map_err(PublishError::Source)?;
        let base_ref = if campaign_job.base_ref.is_empty() {
            DEFAULT_BASE_REF.to_string()
        } else {
            campaign_job.base_ref.clone()
        };
        let created = source
            .create_changeset(
                &repo,
                &NewChangeset {
                    title: campaign.name.clone(),
                    body: campaign.description.clone(),
                    head_ref,
                    base_ref,
                },
            )
            .await
            .map_err(PublishError::Source)?;
        if created.already_existed {
            tracing::info!(
                changeset_job_id = job.id,
                external_id = %created.external_id,
                "Changeset already existed on code host"
            );
        }

        let tx = self.store.transact().await?;
        let result = attach_changeset(tx.as_ref(), job, &repo, &service, created).await;
        // The job only takes the attached state once the transaction committed.
        *job = finish(tx.as_ref(), result).await?;
        tracing::info!(
            changeset_job_id = job.id,
            changeset_id = job.changeset_id,
            "Changeset published"
        );
        Ok(())
    }

    /// First connection of `repo` able to create changesets.
    async fn credentialed_service(&self, repo: &Repo) -> Result<ExternalService, PublishError> {
        let mut services = Vec::with_capacity(repo.external_service_ids.len());
        for &id in &repo.external_service_ids {
            match self.store.get_external_service(id).await {
                Ok(svc) => services.push(svc),
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        first_credentialed(&services)
            .cloned()
            .ok_or_else(|| PublishError::NoCredentials(repo.name.clone()))
    }
}

fn commit_info(campaign: &Campaign) -> CommitInfo {
    let message = if campaign.description.trim().is_empty() {
        campaign.name.clone()
    } else {
        format!("{}\n\n{}", campaign.name, campaign.description)
    };
    CommitInfo {
        message,
        author_name: COMMIT_AUTHOR_NAME.to_string(),
        author_email: COMMIT_AUTHOR_EMAIL.to_string(),
    }
}

/// Store the changeset (reusing an existing row for the same external id)
/// and link it to the job and the campaign. Returns the updated job.
async fn attach_changeset(
    tx: &dyn Store,
    job: &ChangesetJob,
    repo: &Repo,
    service: &ExternalService,
    created: CreatedChangeset,
) -> Result<ChangesetJob, PublishError> {
    let mut campaign = tx.get_campaign(job.campaign_id).await?;
    let service_type = service.kind.service_type();

    let changeset = match tx
        .get_changeset_by_external_id(&created.external_id, service_type)
        .await?
    {
        Some(mut existing) => {
            existing.add_campaign(campaign.id);
            existing.metadata = created.metadata;
            let mut updated = tx.update_changesets(std::slice::from_ref(&existing)).await?;
            updated.pop().unwrap_or(existing)
        }
        None => {
            let now = Utc::now();
            tx.create_changeset(Changeset {
                id: 0,
                repo_id: repo.id,
                campaign_ids: BTreeSet::from([campaign.id]),
                external_id: created.external_id,
                external_service_type: service_type.to_string(),
                metadata: created.metadata,
                external_deleted_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?
        }
    };

    let attached = tx
        .update_changeset_job(&ChangesetJob {
            changeset_id: changeset.id,
            ..job.clone()
        })
        .await?;
    campaign.add_changeset(changeset.id);
    tx.update_campaign(&campaign).await?;
    Ok(attached)
}

/// Make the failed jobs of a campaign claimable again.
///
/// Only jobs with a non-blank error and both timestamps set are touched.
pub async fn reset_failed_changeset_jobs(
    store: &dyn Store,
    campaign_id: DbId,
) -> Result<usize, StoreError> {
    let tx = store.transact().await?;
    let result = async {
        let jobs = tx
            .list_changeset_jobs(campaign_id, ListOptions::all())
            .await?
            .items;
        let mut reset = 0;
        for mut job in jobs.into_iter().filter(ChangesetJob::is_failed) {
            job.reset();
            tx.update_changeset_job(&job).await?;
            reset += 1;
        }
        Ok::<_, StoreError>(reset)
    }
    .await;
    let reset = finish(tx.as_ref(), result).await?;
    tracing::info!(campaign_id, reset, "Failed changeset jobs reset");
    Ok(reset)
}
