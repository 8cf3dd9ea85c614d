//! Reconciliation of stored changesets against their code hosts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use armada_core::changeset::Changeset;
use armada_core::events::ChangesetEvent;
use armada_core::repo::{first_credentialed, ExternalService, Repo};
use armada_core::types::DbId;
use armada_db::{finish, ListOptions, Store, StoreError};

use crate::capabilities::{BoxError, SourceFactory};
use crate::event_merge::upsert_merged_events;

/// Changesets listed per store round trip.
pub const SYNC_PAGE_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("loading changesets from {service} failed: {source}")]
    Load {
        service: String,
        #[source]
        source: BoxError,
    },
}

pub struct Syncer {
    store: Arc<dyn Store>,
    sources: Arc<dyn SourceFactory>,
}

impl Syncer {
    pub fn new(store: Arc<dyn Store>, sources: Arc<dyn SourceFactory>) -> Self {
        Self { store, sources }
    }

    /// Refresh every stored changeset.
    pub async fn sync(&self) -> Result<(), SyncError> {
        let mut changesets = Vec::new();
        let mut cursor = 0;
        loop {
            let page = self
                .store
                .list_changesets(ListOptions::page(cursor, SYNC_PAGE_SIZE))
                .await?;
            changesets.extend(page.items);
            if page.next_cursor == 0 {
                break;
            }
            cursor = page.next_cursor;
        }
        tracing::info!(changesets = changesets.len(), "Syncing changesets");
        self.sync_changesets(changesets).await
    }

    /// Refresh `changesets` from their code hosts and persist the new
    /// metadata and derived events in one transaction.
    pub async fn sync_changesets(&self, changesets: Vec<Changeset>) -> Result<(), SyncError> {
        if changesets.is_empty() {
            return Ok(());
        }

        let repo_ids: Vec<DbId> = {
            let mut ids: Vec<DbId> = changesets.iter().map(|c| c.repo_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let repos: HashMap<DbId, Repo> = self
            .store
            .list_repos(&repo_ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let services: HashMap<DbId, ExternalService> = self
            .store
            .list_external_services(None)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let mut groups: BTreeMap<DbId, Vec<Changeset>> = BTreeMap::new();
        for changeset in changesets {
            let Some(repo) = repos.get(&changeset.repo_id) else {
                tracing::warn!(
                    changeset_id = changeset.id,
                    repo_id = changeset.repo_id,
                    "Repository not found, skipping changeset"
                );
                continue;
            };
            let candidates: Vec<ExternalService> = repo
                .external_service_ids
                .iter()
                .filter_map(|id| services.get(id).cloned())
                .collect();
            // Reads work without a token, but a credentialed connection
            // has better rate limits.
            let Some(service) = first_credentialed(&candidates).or(candidates.first()) else {
                tracing::warn!(
                    changeset_id = changeset.id,
                    repo = %repo.name,
                    "Repository has no code-host connection, skipping changeset"
                );
                continue;
            };
            groups.entry(service.id).or_default().push(changeset);
        }

        let mut refreshed = Vec::new();
        let mut events: Vec<ChangesetEvent> = Vec::new();
        for (service_id, mut batch) in groups {
            let Some(service) = services.get(&service_id) else {
                continue;
            };
            let source = self.sources.source_for(service).map_err(|source| SyncError::Load {
                service: service.display_name.clone(),
                source,
            })?;
            source
                .load_changesets(&mut batch)
                .await
                .map_err(|source| SyncError::Load {
                    service: service.display_name.clone(),
                    source,
                })?;
            tracing::debug!(
                external_service_id = service_id,
                changesets = batch.len(),
                "Changesets loaded"
            );
            for changeset in &batch {
                events.extend(changeset.events());
            }
            refreshed.extend(batch);
        }

        let tx = self.store.transact().await?;
        let result = async {
            tx.update_changesets(&refreshed).await?;
            upsert_merged_events(tx.as_ref(), events).await
        }
        .await;
        let saved = finish(tx.as_ref(), result).await?;
        tracing::info!(
            changesets = refreshed.len(),
            events = saved.len(),
            "Changesets synced"
        );
        Ok(())
    }
}
