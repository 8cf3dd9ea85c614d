//! Merge-then-upsert of changeset events.
//!
//! Sync and webhooks each see a different subset of an occurrence's
//! fields, so an incoming event is folded into the stored one with
//! [`ChangesetEvent::update`] before it is written back.

use std::collections::{HashMap, HashSet};

use armada_core::events::{ChangesetEvent, ChangesetEventKind};
use armada_core::types::DbId;
use armada_db::{Store, StoreError};

type Identity = (DbId, ChangesetEventKind, String);

/// Merge `incoming` into the stored events sharing its identity and upsert
/// the result. Incoming duplicates are folded into one row first.
pub async fn upsert_merged_events(
    store: &dyn Store,
    incoming: Vec<ChangesetEvent>,
) -> Result<Vec<ChangesetEvent>, StoreError> {
    if incoming.is_empty() {
        return Ok(Vec::new());
    }

    let mut changeset_ids: Vec<DbId> = incoming.iter().map(|e| e.changeset_id).collect();
    changeset_ids.sort_unstable();
    changeset_ids.dedup();

    let mut stored: HashMap<Identity, ChangesetEvent> = store
        .list_changeset_events(&changeset_ids)
        .await?
        .into_iter()
        .map(|e| ((e.changeset_id, e.kind, e.key.clone()), e))
        .collect();

    let mut order = Vec::new();
    let mut seen = HashSet::new();
    for event in incoming {
        let identity = (event.changeset_id, event.kind, event.key.clone());
        match stored.get_mut(&identity) {
            Some(existing) => existing.update(&event),
            None => {
                stored.insert(identity.clone(), event);
            }
        }
        if seen.insert(identity.clone()) {
            order.push(identity);
        }
    }

    let merged: Vec<ChangesetEvent> = order
        .iter()
        .filter_map(|identity| stored.remove(identity))
        .collect();
    let saved = store.upsert_changeset_events(&merged).await?;
    tracing::debug!(events = saved.len(), "Changeset events upserted");
    Ok(saved)
}

/// Merge a single event into its stored counterpart, if any, and upsert it.
pub async fn upsert_merged_event(
    store: &dyn Store,
    event: ChangesetEvent,
) -> Result<ChangesetEvent, StoreError> {
    let merged = match store
        .get_changeset_event(event.changeset_id, event.kind, &event.key)
        .await?
    {
        Some(mut existing) => {
            existing.update(&event);
            existing
        }
        None => event,
    };
    let mut saved = store.upsert_changeset_events(std::slice::from_ref(&merged)).await?;
    Ok(saved.pop().unwrap_or(merged))
}
