//! Bitbucket Server webhook payloads.
//!
//! The server-side webhook plugin posts pull-request activities with the
//! same shape the REST API returns them in, so an activity converts into
//! an event with the key sync would give it.

use armada_core::bitbucket_server::{Activity, PullRequest};
use armada_core::events::{ChangesetEventKind, EventMetadata};
use serde::Deserialize;

use super::WebhookEvent;

/// Header naming the event type.
pub const EVENT_HEADER: &str = "x-event-key";
/// Header carrying `sha256=<hex hmac>` of the body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

const ACTIVITY_PREFIX: &str = "pr:activity:";

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported Bitbucket Server event {0:?}")]
    UnknownEvent(String),

    #[error("malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityPayload {
    pull_request: PullRequest,
    activity: Activity,
}

/// Convert one delivery. `Ok(None)` means the delivery is valid but carries
/// nothing worth recording.
pub fn parse_event(event_key: &str, body: &[u8]) -> Result<Option<WebhookEvent>, ParseError> {
    if event_key.starts_with(ACTIVITY_PREFIX) {
        let payload: ActivityPayload =
            serde_json::from_slice(body).map_err(|source| ParseError::Payload {
                event: event_key.to_string(),
                source,
            })?;
        return Ok(Some(WebhookEvent {
            external_ids: vec![payload.pull_request.id.to_string()],
            kind: ChangesetEventKind::for_activity(payload.activity.action),
            metadata: EventMetadata::BitbucketServerActivity(payload.activity),
        }));
    }
    match event_key {
        "ping" | "diagnostics:ping" => Ok(None),
        // Pull-request and repository notifications without an activity
        // are picked up by the next sync.
        key if key.starts_with("pr:") || key.starts_with("repo:") => Ok(None),
        other => Err(ParseError::UnknownEvent(other.to_string())),
    }
}
