//! Periodic deletion of expired campaign plans.
//!
//! A plan is deleted once it is older than the retention window, every job
//! of it has finished and no campaign references it.

use std::sync::Arc;
use std::time::Duration;

use armada_db::Store;
use armada_pipeline::plan_runner::delete_expired_plans;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300); // 5 minutes

/// Run the plan retention loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn Store>, retention: chrono::Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_minutes = retention.num_minutes(),
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Plan retention job started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Plan retention job stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = delete_expired_plans(store.as_ref(), retention).await {
                    tracing::error!(error = %e, "Plan retention: sweep failed");
                }
            }
        }
    }
}
