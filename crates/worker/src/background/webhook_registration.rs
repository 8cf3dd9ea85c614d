//! Keeps the webhook registered on every Bitbucket Server connection that
//! declares a webhook secret.
//!
//! GitHub webhooks are configured by the organization owner; Bitbucket
//! Server connections get theirs created or refreshed by this loop.

use std::sync::Arc;
use std::time::Duration;

use armada_core::repo::{ExternalService, ExternalServiceKind};
use armada_db::{Store, StoreError};
use armada_pipeline::capabilities::{WebhookRegistrar, WebhookRegistration};
use tokio_util::sync::CancellationToken;

/// Name the webhook is registered under; upserts match on it.
pub const WEBHOOK_NAME: &str = "armada-campaigns";

/// Route the API serves Bitbucket Server deliveries on.
pub const WEBHOOK_PATH: &str = "/.api/bitbucket-server-webhooks";

/// Pull-request events the webhook subscribes to.
pub const WEBHOOK_EVENTS: &[&str] = &[
    "pr:activity:status",
    "pr:activity:event",
    "pr:activity:approval",
    "pr:activity:comment",
    "pr:activity:rescope",
    "pr:activity:merge",
];

pub struct WebhookRegistrationScheduler {
    store: Arc<dyn Store>,
    registrar: Arc<dyn WebhookRegistrar>,
    url: String,
    interval: Duration,
}

impl WebhookRegistrationScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        registrar: Arc<dyn WebhookRegistrar>,
        external_url: &str,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            registrar,
            url: format!("{}{WEBHOOK_PATH}", external_url.trim_end_matches('/')),
            interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            url = %self.url,
            interval_secs = self.interval.as_secs(),
            "Webhook registration job started"
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Webhook registration job stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.register_all().await {
                        tracing::error!(error = %e, "Webhook registration: listing connections failed");
                    }
                }
            }
        }
    }

    /// Upsert the webhook on every eligible connection.
    ///
    /// Returns how many registrations succeeded. A failing connection is
    /// logged and does not stop the others.
    pub async fn register_all(&self) -> Result<usize, StoreError> {
        let services = self
            .store
            .list_external_services(Some(ExternalServiceKind::BitbucketServer))
            .await?;

        let mut registered = 0;
        for service in &services {
            let Some(registration) = self.registration_for(service) else {
                continue;
            };
            match self.registrar.upsert_webhook(service, &registration).await {
                Ok(()) => {
                    registered += 1;
                    tracing::debug!(service_id = service.id, "Webhook registered");
                }
                Err(e) => {
                    tracing::warn!(
                        service_id = service.id,
                        error = %e,
                        "Webhook registration failed"
                    );
                }
            }
        }
        Ok(registered)
    }

    fn registration_for(&self, service: &ExternalService) -> Option<WebhookRegistration> {
        let secret = service.webhook_secrets().next()?;
        Some(WebhookRegistration {
            name: WEBHOOK_NAME.into(),
            url: self.url.clone(),
            secret: secret.to_string(),
            events: WEBHOOK_EVENTS.iter().map(|e| e.to_string()).collect(),
        })
    }
}
