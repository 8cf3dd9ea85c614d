use std::sync::Arc;

use armada_db::Store;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Source of truth for changesets, events and code-host connections.
    pub store: Arc<dyn Store>,
    pub config: Arc<ServerConfig>,
}
