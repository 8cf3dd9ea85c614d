//! Long-running campaign work.
//!
//! - [`changeset_workers`] publishes pending changeset jobs with a fixed
//!   pool of workers.
//! - [`background`] holds the scheduled loops: changeset sync, plan
//!   retention and webhook registration.
//!
//! Every loop takes a [`tokio_util::sync::CancellationToken`] and returns
//! once it is cancelled.

pub mod background;
pub mod changeset_workers;
pub mod config;
