//! Fixed pool of changeset-job publishers.
//!
//! Each worker claims the next pending job through the store, publishes it
//! and immediately polls again. An empty queue or a failure makes the
//! worker back off. Cancellation stops polling; a job already claimed is
//! published to the end first.

use std::sync::Arc;
use std::time::Duration;

use armada_core::campaign::ChangesetJob;
use armada_db::{Store, StoreError};
use armada_pipeline::publication::Publisher;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;

pub struct ChangesetJobWorkers {
    store: Arc<dyn Store>,
    publisher: Arc<Publisher>,
    workers: usize,
    backoff: Duration,
}

/// What one poll of the queue did.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The queue was empty.
    Idle,
    /// A job was claimed and processed; its error, if any, is recorded on it.
    Processed(ChangesetJob),
}

impl ChangesetJobWorkers {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<Publisher>, config: &WorkerConfig) -> Self {
        Self {
            store,
            publisher,
            workers: config.changeset_job_workers.max(1),
            backoff: config.changeset_job_backoff,
        }
    }

    /// Run every worker until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            workers = self.workers,
            backoff_ms = self.backoff.as_millis() as u64,
            "Changeset job workers started"
        );
        join_all((0..self.workers).map(|worker| self.work(worker, &cancel))).await;
        tracing::info!("Changeset job workers stopped");
    }

    /// Claim and process at most one job.
    pub async fn poll_once(&self) -> Result<Claim, StoreError> {
        let Some(job) = self.store.claim_next_pending_changeset_job().await? else {
            return Ok(Claim::Idle);
        };
        let job = self.publisher.run_changeset_job(job).await?;
        Ok(Claim::Processed(job))
    }

    async fn work(&self, worker: usize, cancel: &CancellationToken) {
        while !cancel.is_cancelled() {
            let pause = match self.poll_once().await {
                Ok(Claim::Processed(job)) if job.is_failed() => {
                    tracing::warn!(
                        worker,
                        job_id = job.id,
                        error = %job.error,
                        "Changeset job failed"
                    );
                    true
                }
                Ok(Claim::Processed(job)) => {
                    tracing::debug!(
                        worker,
                        job_id = job.id,
                        changeset_id = job.changeset_id,
                        "Changeset job published"
                    );
                    false
                }
                Ok(Claim::Idle) => true,
                Err(e) => {
                    tracing::error!(worker, error = %e, "Changeset job worker: store error");
                    true
                }
            };

            if pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }
        tracing::debug!(worker, "Changeset job worker stopping");
    }
}
