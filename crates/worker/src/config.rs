use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Changeset-job workers polling the queue (default: `8`).
    pub changeset_job_workers: usize,
    /// Pause after an empty poll or a failed job (default: `1000`ms).
    pub changeset_job_backoff: Duration,
    /// Time between two full changeset syncs (default: `600`s).
    pub changeset_sync_interval: Duration,
    /// Age after which finished, unattached plans are deleted (default: `60` minutes).
    pub plan_retention: chrono::Duration,
    /// Time between two webhook registration rounds (default: `60`s).
    pub webhook_registration_interval: Duration,
    /// Base URL code hosts deliver webhooks to.
    pub external_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            changeset_job_workers: 8,
            changeset_job_backoff: Duration::from_millis(1000),
            changeset_sync_interval: Duration::from_secs(600),
            plan_retention: chrono::Duration::minutes(60),
            webhook_registration_interval: Duration::from_secs(60),
            external_url: "http://localhost:3080".into(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                              | Default                 |
    /// |--------------------------------------|-------------------------|
    /// | `CHANGESET_JOB_WORKERS`              | `8`                     |
    /// | `CHANGESET_JOB_BACKOFF_MS`           | `1000`                  |
    /// | `CHANGESET_SYNC_INTERVAL_SECS`       | `600`                   |
    /// | `PLAN_RETENTION_MINUTES`             | `60`                    |
    /// | `WEBHOOK_REGISTRATION_INTERVAL_SECS` | `60`                    |
    /// | `EXTERNAL_URL`                       | `http://localhost:3080` |
    pub fn from_env() -> Self {
        let changeset_job_workers: usize = std::env::var("CHANGESET_JOB_WORKERS")
            .unwrap_or_else(|_| "8".into())
            .parse()
            .expect("CHANGESET_JOB_WORKERS must be a valid usize");

        let backoff_ms: u64 = std::env::var("CHANGESET_JOB_BACKOFF_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("CHANGESET_JOB_BACKOFF_MS must be a valid u64");

        let sync_interval_secs: u64 = std::env::var("CHANGESET_SYNC_INTERVAL_SECS")
            .unwrap_or_else(|_| "600".into())
            .parse()
            .expect("CHANGESET_SYNC_INTERVAL_SECS must be a valid u64");

        let plan_retention_minutes: i64 = std::env::var("PLAN_RETENTION_MINUTES")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("PLAN_RETENTION_MINUTES must be a valid i64");

        let registration_interval_secs: u64 =
            std::env::var("WEBHOOK_REGISTRATION_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .expect("WEBHOOK_REGISTRATION_INTERVAL_SECS must be a valid u64");

        let external_url =
            std::env::var("EXTERNAL_URL").unwrap_or_else(|_| "http://localhost:3080".into());

        Self {
            changeset_job_workers: changeset_job_workers.max(1),
            changeset_job_backoff: Duration::from_millis(backoff_ms),
            changeset_sync_interval: Duration::from_secs(sync_interval_secs.max(1)),
            plan_retention: chrono::Duration::minutes(plan_retention_minutes),
            webhook_registration_interval: Duration::from_secs(registration_interval_secs.max(1)),
            external_url: external_url.trim_end_matches('/').to_string(),
        }
    }
}
