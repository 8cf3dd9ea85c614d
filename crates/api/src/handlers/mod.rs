//! Request handlers.
//!
//! Handlers authenticate and decode the request, delegate to the webhook
//! ingestion layer, and map failures via [`AppError`](crate::error::AppError).

pub mod webhooks;
