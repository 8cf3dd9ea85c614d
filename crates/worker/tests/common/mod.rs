//! Shared fixtures and capability fakes for the worker tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use armada_core::campaign::{Campaign, CampaignJob, CampaignPlan, Namespace};
use armada_core::changeset::{Changeset, ChangesetMetadata};
use armada_core::github;
use armada_core::repo::{
    ExternalService, ExternalServiceConfig, ExternalServiceKind, Repo, WebhookSecret,
};
use armada_db::{MemoryStore, Store};
use armada_pipeline::campaigns::{create_campaign, NewCampaign};
use armada_pipeline::capabilities::{
    BoxError, ChangesetSource, CreateCommitFromPatchRequest, CreatedChangeset, GitClient,
    NewChangeset, SourceFactory, WebhookRegistrar, WebhookRegistration,
};
use armada_pipeline::publication::Publisher;
use async_trait::async_trait;
use chrono::Utc;

// ---------------------------------------------------------------------------
// Store fixtures
// ---------------------------------------------------------------------------

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

pub async fn seed_repo(store: &MemoryStore, service: &ExternalService, name: &str) -> Repo {
    store
        .insert_repo(Repo {
            id: 0,
            name: name.into(),
            kind: service.kind,
            external_service_ids: vec![service.id],
        })
        .await
        .unwrap()
}

pub fn pull_request(number: i64, title: &str) -> github::PullRequest {
    github::PullRequest {
        id: format!("PR_{number}"),
        number,
        title: title.into(),
        state: "OPEN".into(),
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
        ..Default::default()
    }
}

pub async fn seed_plan(store: &MemoryStore) -> CampaignPlan {
    let now = Utc::now();
    store
        .create_campaign_plan(CampaignPlan {
            id: 0,
            campaign_type: "comby".into(),
            arguments: serde_json::json!({}),
            canceled_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}

/// A campaign over one GitHub repository per name, each with a finished
/// plan job carrying a diff and therefore one pending changeset job.
pub async fn seed_campaign(store: &MemoryStore, names: &[&str]) -> Campaign {
    let service = seed_service(store, ExternalServiceKind::GitHub, &[]).await;
    let plan = seed_plan(store).await;
    for name in names {
        let repo = seed_repo(store, &service, name).await;
        let now = Utc::now();
        store
            .create_campaign_job(CampaignJob {
                id: 0,
                campaign_plan_id: plan.id,
                repo_id: repo.id,
                rev: format!("{name}-head"),
                base_ref: "refs/heads/main".into(),
                diff: "--- README\n+++ README\n@@ -1 +1 @@\n-old\n+new".into(),
                description: "Rewrite README".into(),
                error: String::new(),
                started_at: Some(now),
                finished_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }
    create_campaign(
        store,
        NewCampaign {
            name: "Update README".into(),
            description: "Keeps READMEs current".into(),
            author_id: 1,
            namespace: Namespace::User(1),
            campaign_plan_id: Some(plan.id),
        },
    )
    .await
    .unwrap()
}

pub fn publisher(store: &MemoryStore, git: Arc<FakeGit>, source: Arc<FakeSource>) -> Arc<Publisher> {
    Arc::new(Publisher::new(
        Arc::new(store.clone()),
        git,
        Arc::new(FakeSources(source)),
    ))
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ---------------------------------------------------------------------------
// Capability fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGit {
    /// Repositories whose push is rejected.
    pub reject: HashSet<String>,
    pub pushed: Mutex<Vec<String>>,
}

#[async_trait]
impl GitClient for FakeGit {
    async fn create_commit_from_patch(
        &self,
        request: CreateCommitFromPatchRequest,
    ) -> Result<String, BoxError> {
        if self.reject.contains(&request.repo) {
            return Err("push rejected".into());
        }
        self.pushed.lock().unwrap().push(request.repo.clone());
        Ok(request.target_ref)
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub next_number: Mutex<i64>,
    /// Metadata handed out by `load_changesets`, by external id.
    pub remote: Mutex<HashMap<String, ChangesetMetadata>>,
}

#[async_trait]
impl ChangesetSource for FakeSource {
    async fn create_changeset(
        &self,
        _repo: &Repo,
        changeset: &NewChangeset,
    ) -> Result<CreatedChangeset, BoxError> {
        let number = {
            let mut next = self.next_number.lock().unwrap();
            *next += 1;
            *next
        };
        Ok(CreatedChangeset {
            external_id: number.to_string(),
            metadata: ChangesetMetadata::GitHub(pull_request(number, &changeset.title)),
            already_existed: false,
        })
    }

    async fn load_changesets(&self, changesets: &mut [Changeset]) -> Result<(), BoxError> {
        let remote = self.remote.lock().unwrap();
        for changeset in changesets.iter_mut() {
            if let Some(metadata) = remote.get(&changeset.external_id) {
                changeset.metadata = metadata.clone();
            }
        }
        Ok(())
    }
}

pub struct FakeSources(pub Arc<FakeSource>);

impl SourceFactory for FakeSources {
    fn source_for(&self, _service: &ExternalService) -> Result<Arc<dyn ChangesetSource>, BoxError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct FakeRegistrar {
    /// Connections whose registration call fails.
    pub failing: HashSet<i64>,
    pub registered: Mutex<Vec<(i64, WebhookRegistration)>>,
}

#[async_trait]
impl WebhookRegistrar for FakeRegistrar {
    async fn upsert_webhook(
        &self,
        service: &ExternalService,
        registration: &WebhookRegistration,
    ) -> Result<(), BoxError> {
        if self.failing.contains(&service.id) {
            return Err("403 Forbidden".into());
        }
        self.registered
            .lock()
            .unwrap()
            .push((service.id, registration.clone()));
        Ok(())
    }
}
