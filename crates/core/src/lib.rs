//! Armada domain model.
//!
//! Pure types and algorithms shared by every other crate: the campaign and
//! changeset entities, provider-specific pull-request metadata, the
//! canonical changeset event model with its field-level merge rules,
//! review-state selection, and the historical counts reconstruction.
//! Nothing in here performs I/O.

pub mod bitbucket_server;
pub mod campaign;
pub mod changeset;
pub mod error;
pub mod events;
pub mod github;
pub mod merge;
pub mod repo;
pub mod review;
pub mod signature;
pub mod status;
pub mod time_series;
pub mod types;
