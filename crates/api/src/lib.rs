//! Webhook HTTP surface.
//!
//! Exposes the router builder together with its config, state and error
//! types so an embedding binary and the integration tests assemble the
//! same middleware stack.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
pub mod webhooks;
