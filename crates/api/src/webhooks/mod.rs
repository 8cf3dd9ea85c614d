//! Webhook ingestion shared by every code host.
//!
//! Each delivery is authenticated against the webhook secrets of all
//! connections of its kind, converted into one canonical event and merged
//! into the history of every tracked changeset it affects.

pub mod bitbucket_server;
pub mod github;

use armada_core::error::MultiError;
use armada_core::events::{ChangesetEvent, ChangesetEventKind, EventMetadata};
use armada_core::repo::ExternalServiceKind;
use armada_core::signature::find_matching_secret;
use armada_db::{finish, Store};
use armada_pipeline::event_merge::upsert_merged_event;
use axum::http::HeaderMap;

use crate::error::{AppError, AppResult};

/// A delivery converted into the canonical model, not yet bound to a
/// stored changeset.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// External ids of the pull requests the event belongs to.
    pub external_ids: Vec<String>,
    pub kind: ChangesetEventKind,
    pub metadata: EventMetadata,
}

/// Read a header as UTF-8, treating a non-UTF-8 value as absent.
pub(crate) fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check the delivery's signature against every secret configured for
/// connections of `kind`.
pub async fn authenticate(
    store: &dyn Store,
    kind: ExternalServiceKind,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<()> {
    let services = store.list_external_services(Some(kind)).await?;
    let secrets: Vec<&str> = services.iter().flat_map(|s| s.webhook_secrets()).collect();
    if secrets.is_empty() {
        tracing::warn!(kind = ?kind, "Webhook received but no secret is configured");
        return Err(AppError::Unauthorized("no webhook secret configured".into()));
    }
    let Some(signature) = signature else {
        return Err(AppError::Unauthorized("missing signature".into()));
    };
    if find_matching_secret(secrets, body, signature).is_none() {
        tracing::warn!(kind = ?kind, "Webhook signature mismatch");
        return Err(AppError::Unauthorized("signature mismatch".into()));
    }
    Ok(())
}

/// Merge `event` into every tracked changeset it names.
///
/// Untracked changesets are skipped. Failures are collected; merges that
/// succeeded before a failure stay applied.
pub async fn apply(
    store: &dyn Store,
    kind: ExternalServiceKind,
    event: WebhookEvent,
) -> AppResult<usize> {
    let service_type = kind.service_type();
    let mut errors = MultiError::new();
    let mut applied = 0;

    for external_id in &event.external_ids {
        let changeset = match store
            .get_changeset_by_external_id(external_id, service_type)
            .await
        {
            Ok(Some(changeset)) => changeset,
            Ok(None) => {
                tracing::debug!(external_id = %external_id, "Webhook for untracked changeset");
                continue;
            }
            Err(e) => {
                errors.push(format!("looking up changeset {external_id}: {e}"));
                continue;
            }
        };

        let incoming = ChangesetEvent::new(changeset.id, event.kind, event.metadata.clone());
        let merged = async {
            let tx = store.transact().await?;
            let result = upsert_merged_event(tx.as_ref(), incoming).await;
            finish(tx.as_ref(), result).await
        }
        .await;
        match merged {
            Ok(stored) => {
                applied += 1;
                tracing::info!(
                    changeset_id = changeset.id,
                    event_id = stored.id,
                    kind = %stored.kind,
                    "Webhook event merged"
                );
            }
            Err(e) => errors.push(format!("changeset {}: {e}", changeset.id)),
        }
    }

    errors
        .into_result()
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(applied)
}
