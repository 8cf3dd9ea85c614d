#![allow(dead_code)]

use std::sync::Arc;

use armada_api::config::ServerConfig;
use armada_api::router::build_app_router;
use armada_api::state::AppState;
use armada_core::changeset::{Changeset, ChangesetMetadata};
use armada_core::repo::{
    ExternalService, ExternalServiceConfig, ExternalServiceKind, Repo, WebhookSecret,
};
use armada_core::signature::sign;
use armada_core::{bitbucket_server, github};
use armada_db::{MemoryStore, Store};
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const SECRET: &str = "s3cr3t";

/// Build the full application router over `store`.
///
/// Uses the same builder an embedding binary would, so integration tests
/// exercise the real middleware stack (request ID, timeout, tracing, panic
/// recovery).
pub fn build_test_app(store: MemoryStore) -> Router {
    build_test_app_over(Arc::new(store))
}

/// Build the application router over any store implementation.
pub fn build_test_app_over(store: Arc<dyn Store>) -> Router {
    build_app_router(AppState {
        store,
        config: Arc::new(ServerConfig::default()),
    })
}

/// Register a connection of `kind` with the given webhook secrets.
pub async fn seed_service(
    store: &MemoryStore,
    kind: ExternalServiceKind,
    secrets: &[&str],
) -> ExternalService {
    let now = Utc::now();
    store
        .insert_external_service(ExternalService {
            id: 0,
            kind,
            display_name: format!("{kind:?}"),
            config: ExternalServiceConfig {
                url: "https://code.example.com".into(),
                token: Some("token".into()),
                webhooks: secrets
                    .iter()
                    .map(|s| WebhookSecret {
                        org: None,
                        secret: s.to_string(),
                    })
                    .collect(),
            },
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}

/// Store a tracked changeset with external id `external_id` on `kind`.
pub async fn seed_changeset(
    store: &MemoryStore,
    service: &ExternalService,
    external_id: &str,
) -> Changeset {
    let repo = store
        .insert_repo(Repo {
            id: 0,
            name: format!("code.example.com/acme/{external_id}"),
            kind: service.kind,
            external_service_ids: vec![service.id],
        })
        .await
        .unwrap();
    let metadata = match service.kind {
        ExternalServiceKind::GitHub => ChangesetMetadata::GitHub(github::PullRequest {
            state: "OPEN".into(),
            ..Default::default()
        }),
        ExternalServiceKind::BitbucketServer => {
            ChangesetMetadata::BitbucketServer(bitbucket_server::PullRequest {
                state: "OPEN".into(),
                ..Default::default()
            })
        }
    };
    let now = Utc::now();
    store
        .create_changeset(Changeset {
            id: 0,
            repo_id: repo.id,
            campaign_ids: Default::default(),
            external_id: external_id.into(),
            external_service_type: service.kind.service_type().into(),
            metadata,
            external_deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}

/// POST a webhook delivery, signing the body with `secret`.
pub async fn post_webhook(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
    signature_header: &str,
    secret: &str,
    body: &serde_json::Value,
) -> Response<Body> {
    let payload = body.to_string();
    let mut request = Request::post(uri)
        .header("content-type", "application/json")
        .header(signature_header, sign(secret, payload.as_bytes()));
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    app.oneshot(request.body(Body::from(payload)).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
