use std::time::Duration;

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrent diff-generation tasks per plan run. Also the ceiling on
    /// concurrent calls to the diff backend (default: `8`).
    pub diff_concurrency: usize,
    /// Per-repository `generate_diff` timeout (default: `60`s).
    pub diff_fetch_timeout: Duration,
    /// Search results above this abort the run (default: `200`).
    pub max_repositories: usize,
    /// Base URL of the replacer diff backend.
    pub replacer_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            diff_concurrency: 8,
            diff_fetch_timeout: Duration::from_secs(60),
            max_repositories: 200,
            replacer_url: "http://replacer:3185".into(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `DIFF_CONCURRENCY`        | `8`                     |
    /// | `DIFF_FETCH_TIMEOUT_SECS` | `60`                    |
    /// | `MAX_REPOSITORIES`        | `200`                   |
    /// | `REPLACER_URL`            | `http://replacer:3185`  |
    pub fn from_env() -> Self {
        let diff_concurrency: usize = std::env::var("DIFF_CONCURRENCY")
            .unwrap_or_else(|_| "8".into())
            .parse()
            .expect("DIFF_CONCURRENCY must be a valid usize");

        let diff_fetch_timeout_secs: u64 = std::env::var("DIFF_FETCH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("DIFF_FETCH_TIMEOUT_SECS must be a valid u64");

        let max_repositories: usize = std::env::var("MAX_REPOSITORIES")
            .unwrap_or_else(|_| "200".into())
            .parse()
            .expect("MAX_REPOSITORIES must be a valid usize");

        let replacer_url =
            std::env::var("REPLACER_URL").unwrap_or_else(|_| "http://replacer:3185".into());

        Self {
            diff_concurrency: diff_concurrency.max(1),
            diff_fetch_timeout: Duration::from_secs(diff_fetch_timeout_secs),
            max_repositories,
            replacer_url,
        }
    }
}
