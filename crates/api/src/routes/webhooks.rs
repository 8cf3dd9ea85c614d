//! Route definitions for code-host webhooks.
//!
//! ```text
//! POST   /.api/github-webhooks              github_webhook
//! POST   /.api/bitbucket-server-webhooks    bitbucket_server_webhook
//! ```

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/.api/github-webhooks", post(webhooks::github_webhook))
        .route(
            "/.api/bitbucket-server-webhooks",
            post(webhooks::bitbucket_server_webhook),
        )
}
