//! Handlers for code-host webhook deliveries.
//!
//! Every delivery is answered with:
//! - `200` once processed, including deliveries that change nothing,
//! - `400` when the event type is unknown or the payload does not parse,
//! - `401` when no configured secret matches the signature,
//! - `500` when merging into a tracked changeset failed.

use armada_core::repo::ExternalServiceKind;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::webhooks::{self, apply, authenticate, bitbucket_server, github, header};

/// POST /.api/github-webhooks
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let kind = ExternalServiceKind::GitHub;
    authenticate(
        state.store.as_ref(),
        kind,
        header(&headers, github::SIGNATURE_HEADER),
        &body,
    )
    .await?;

    let event_type = header(&headers, github::EVENT_HEADER)
        .ok_or_else(|| AppError::BadRequest("missing X-GitHub-Event header".into()))?;
    let event = github::parse_event(event_type, &body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    process(&state, kind, event).await
}

/// POST /.api/bitbucket-server-webhooks
pub async fn bitbucket_server_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let kind = ExternalServiceKind::BitbucketServer;
    authenticate(
        state.store.as_ref(),
        kind,
        header(&headers, bitbucket_server::SIGNATURE_HEADER),
        &body,
    )
    .await?;

    let event_key = header(&headers, bitbucket_server::EVENT_HEADER)
        .ok_or_else(|| AppError::BadRequest("missing X-Event-Key header".into()))?;
    let event = bitbucket_server::parse_event(event_key, &body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    process(&state, kind, event).await
}

async fn process(
    state: &AppState,
    kind: ExternalServiceKind,
    event: Option<webhooks::WebhookEvent>,
) -> AppResult<StatusCode> {
    let Some(event) = event else {
        tracing::debug!(kind = ?kind, "Webhook carried no changeset event");
        return Ok(StatusCode::OK);
    };
    apply(state.store.as_ref(), kind, event).await?;
    Ok(StatusCode::OK)
}
