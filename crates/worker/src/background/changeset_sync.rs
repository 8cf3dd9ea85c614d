//! Scheduled reconciliation of every tracked changeset.

use std::time::Duration;

use armada_pipeline::sync::Syncer;
use tokio_util::sync::CancellationToken;

pub struct ChangesetSyncScheduler {
    syncer: Syncer,
    interval: Duration,
}

impl ChangesetSyncScheduler {
    pub fn new(syncer: Syncer, interval: Duration) -> Self {
        Self { syncer, interval }
    }

    /// Sync on every tick until `cancel` fires. A failed round is logged and
    /// retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Changeset sync scheduler started"
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Changeset sync scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.syncer.sync().await {
                        tracing::error!(error = %e, "Changeset sync failed");
                    }
                }
            }
        }
    }
}
