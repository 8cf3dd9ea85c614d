//! Campaign orchestration services.
//!
//! - [`plan_runner`] fans diff generation out across repositories.
//! - [`publication`] turns accepted diffs into code-host changesets.
//! - [`sync`] reconciles stored changesets with their code host.
//! - [`event_merge`] folds incoming events into stored history; shared by
//!   sync and webhook ingestion.
//!
//! Everything outside the process (repository search, git, code-host APIs,
//! the diff backend) is reached through the traits in [`capabilities`].

pub mod campaign_types;
pub mod campaigns;
pub mod capabilities;
pub mod config;
pub mod event_merge;
pub mod plan_runner;
pub mod publication;
pub mod sync;
