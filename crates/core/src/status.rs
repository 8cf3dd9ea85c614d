//! Derived progress of a set of background jobs.

use serde::Serialize;

use crate::campaign::CampaignJob;
use crate::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundProcessState {
    Processing,
    Completed,
    Errored,
    Canceled,
}

/// Never persisted; recomputed from the jobs on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundProcessStatus {
    pub state: BackgroundProcessState,
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
    pub errors: Vec<String>,
}

impl BackgroundProcessStatus {
    /// Summarize the jobs of a plan canceled at `canceled_at`, if ever.
    pub fn from_jobs(jobs: &[CampaignJob], canceled_at: Option<Timestamp>) -> Self {
        let total = jobs.len();
        let pending = jobs.iter().filter(|j| !j.is_finished()).count();
        let errors: Vec<String> = jobs
            .iter()
            .filter(|j| !j.error.is_empty())
            .map(|j| j.error.clone())
            .collect();

        let state = if canceled_at.is_some() {
            BackgroundProcessState::Canceled
        } else if pending > 0 {
            BackgroundProcessState::Processing
        } else if !errors.is_empty() {
            BackgroundProcessState::Errored
        } else {
            BackgroundProcessState::Completed
        };

        Self {
            state,
            total,
            pending,
            completed: total - pending,
            errors,
        }
    }

    pub fn finished(&self) -> bool {
        self.state != BackgroundProcessState::Processing
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn job(finished: bool, error: &str) -> CampaignJob {
        let now = Utc::now();
        CampaignJob {
            id: 0,
            campaign_plan_id: 1,
            repo_id: 1,
            rev: "deadbeef".into(),
            base_ref: "refs/heads/main".into(),
            diff: String::new(),
            description: String::new(),
            error: error.into(),
            started_at: Some(now),
            finished_at: finished.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_jobs_mean_processing() {
        let status = BackgroundProcessStatus::from_jobs(&[job(true, ""), job(false, "")], None);
        assert_eq!(status.state, BackgroundProcessState::Processing);
        assert_eq!((status.total, status.pending, status.completed), (2, 1, 1));
    }

    #[test]
    fn any_error_means_errored_once_done() {
        let status = BackgroundProcessStatus::from_jobs(&[job(true, ""), job(true, "boom")], None);
        assert_eq!(status.state, BackgroundProcessState::Errored);
        assert_eq!(status.errors, vec!["boom".to_string()]);
    }

    #[test]
    fn no_jobs_is_completed() {
        let status = BackgroundProcessStatus::from_jobs(&[], None);
        assert_eq!(status.state, BackgroundProcessState::Completed);
        assert!(status.finished());
    }

    #[test]
    fn cancellation_overrides_everything() {
        let status = BackgroundProcessStatus::from_jobs(&[job(false, "")], Some(Utc::now()));
        assert_eq!(status.state, BackgroundProcessState::Canceled);
        assert_eq!(status.pending, 1);
    }
}
