//! Shared fixtures and hand-written capability fakes for the pipeline
//! integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use armada_core::campaign::CampaignPlan;
use armada_core::changeset::{Changeset, ChangesetMetadata};
use armada_core::github;
use armada_core::repo::{ExternalService, ExternalServiceConfig, ExternalServiceKind, Repo};
use armada_db::MemoryStore;
use armada_pipeline::campaign_types::{
    CampaignType, CampaignTypeError, CampaignTypes, GeneratedDiff, ReplacerError,
};
use armada_pipeline::capabilities::{
    BoxError, ChangesetSource, CreateCommitFromPatchRequest, CreatedChangeset,
    DefaultBranchResolver, GitClient, NewChangeset, RepoSearch, ResolveError, ResolvedRevision,
    SourceFactory,
};
use armada_pipeline::config::PipelineConfig;
use armada_pipeline::plan_runner::{Completion, PlanRunner};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Store fixtures
// ---------------------------------------------------------------------------

pub fn github_service(token: Option<&str>) -> ExternalService {
    let now = Utc::now();
    ExternalService {
        id: 0,
        kind: ExternalServiceKind::GitHub,
        display_name: "GitHub".into(),
        config: ExternalServiceConfig {
            url: "https://github.com".into(),
            token: token.map(str::to_string),
            webhooks: Vec::new(),
        },
        created_at: now,
        updated_at: now,
    }
}

/// Insert a repository reachable through `service_ids`.
pub async fn seed_repo(store: &MemoryStore, name: &str, service_ids: Vec<i64>) -> Repo {
    store
        .insert_repo(Repo {
            id: 0,
            name: name.into(),
            kind: ExternalServiceKind::GitHub,
            external_service_ids: service_ids,
        })
        .await
        .unwrap()
}

/// A credentialed GitHub connection plus `names.len()` repositories on it.
pub async fn seed_github(store: &MemoryStore, names: &[&str]) -> (ExternalService, Vec<Repo>) {
    let service = store
        .insert_external_service(github_service(Some("secret-token")))
        .await
        .unwrap();
    let mut repos = Vec::new();
    for name in names {
        repos.push(seed_repo(store, name, vec![service.id]).await);
    }
    (service, repos)
}

pub fn open_pull_request(number: i64) -> github::PullRequest {
    github::PullRequest {
        id: format!("PR_{number}"),
        number,
        title: "Campaign".into(),
        state: "OPEN".into(),
        url: format!("https://github.com/acme/repo/pull/{number}"),
        created_at: Some(Utc::now()),
        updated_at: Some(Utc::now()),
        ..Default::default()
    }
}

pub fn github_changeset(repo_id: i64, number: i64) -> Changeset {
    let now = Utc::now();
    Changeset {
        id: 0,
        repo_id,
        campaign_ids: Default::default(),
        external_id: number.to_string(),
        external_service_type: "github".into(),
        metadata: ChangesetMetadata::GitHub(open_pull_request(number)),
        external_deleted_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Search and resolution
// ---------------------------------------------------------------------------

pub struct FakeSearch {
    pub repos: Vec<Repo>,
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn returning(repos: Vec<Repo>) -> Arc<Self> {
        Arc::new(Self {
            repos,
            fail: false,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            repos: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RepoSearch for FakeSearch {
    async fn search(&self, query: &str) -> Result<Vec<Repo>, BoxError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err("search backend unavailable".into());
        }
        Ok(self.repos.clone())
    }
}

/// Resolves every repository to `refs/heads/main` unless told otherwise.
#[derive(Default)]
pub struct FakeResolver {
    pub no_default_branch: HashSet<String>,
    pub broken: HashSet<String>,
}

#[async_trait]
impl DefaultBranchResolver for FakeResolver {
    async fn resolve(&self, repo: &Repo) -> Result<ResolvedRevision, ResolveError> {
        if self.no_default_branch.contains(&repo.name) {
            return Err(ResolveError::NoDefaultBranch(repo.name.clone()));
        }
        if self.broken.contains(&repo.name) {
            return Err(ResolveError::Other("gitserver unreachable".into()));
        }
        Ok(ResolvedRevision {
            ref_name: "refs/heads/main".into(),
            commit_id: format!("{}-head", repo.name),
        })
    }
}

// ---------------------------------------------------------------------------
// Campaign types
// ---------------------------------------------------------------------------

/// Produces `+changed <repo>` for every repository except `failing` ones.
pub struct FakeCampaignType {
    pub failing: HashSet<String>,
    pub unchanged: HashSet<String>,
}

#[async_trait]
impl CampaignType for FakeCampaignType {
    fn search_query(&self) -> String {
        "repo:acme".into()
    }

    async fn generate_diff(
        &self,
        repo: &Repo,
        commit: &str,
    ) -> Result<GeneratedDiff, CampaignTypeError> {
        if self.failing.contains(&repo.name) {
            return Err(CampaignTypeError::Replacer(ReplacerError::Status {
                status: 500,
                body: format!("cannot rewrite {}", repo.name),
            }));
        }
        if self.unchanged.contains(&repo.name) {
            return Ok(GeneratedDiff::default());
        }
        Ok(GeneratedDiff {
            diff: format!("--- README\n+++ README\n@@ -1 +1 @@\n-old\n+changed {} at {commit}", repo.name),
            description: format!("Rewrote {}", repo.name),
        })
    }
}

#[derive(Default)]
pub struct FakeCampaignTypes {
    pub failing: HashSet<String>,
    pub unchanged: HashSet<String>,
}

impl FakeCampaignTypes {
    pub fn failing_for(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            unchanged: HashSet::new(),
        }
    }
}

impl CampaignTypes for FakeCampaignTypes {
    fn build(
        &self,
        name: &str,
        _arguments: &Value,
    ) -> Result<Arc<dyn CampaignType>, CampaignTypeError> {
        match name {
            "fake" => Ok(Arc::new(FakeCampaignType {
                failing: self.failing.clone(),
                unchanged: self.unchanged.clone(),
            })),
            "patch" => Err(CampaignTypeError::PatchNotSupported),
            other => Err(CampaignTypeError::Unknown(other.to_string())),
        }
    }
}

/// Campaign type whose diffs each take `delay`, recording how many were
/// generated at once. Repositories in `panicking` crash the generator.
#[derive(Default, Clone)]
pub struct SlowCampaignTypes {
    pub delay: Duration,
    pub panicking: HashSet<String>,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl SlowCampaignTypes {
    pub fn taking(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CampaignType for SlowCampaignTypes {
    fn search_query(&self) -> String {
        "repo:acme".into()
    }

    async fn generate_diff(
        &self,
        repo: &Repo,
        commit: &str,
    ) -> Result<GeneratedDiff, CampaignTypeError> {
        if self.panicking.contains(&repo.name) {
            panic!("diff generator crashed on {}", repo.name);
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(GeneratedDiff {
            diff: format!("+slow {} at {commit}", repo.name),
            description: String::new(),
        })
    }
}

impl CampaignTypes for SlowCampaignTypes {
    fn build(
        &self,
        _name: &str,
        _arguments: &Value,
    ) -> Result<Arc<dyn CampaignType>, CampaignTypeError> {
        Ok(Arc::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Git and code hosts
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeGit {
    /// Repositories whose push is rejected.
    pub reject: HashSet<String>,
    pub requests: Mutex<Vec<CreateCommitFromPatchRequest>>,
}

#[async_trait]
impl GitClient for FakeGit {
    async fn create_commit_from_patch(
        &self,
        request: CreateCommitFromPatchRequest,
    ) -> Result<String, BoxError> {
        let target = request.target_ref.clone();
        let rejected = self.reject.contains(&request.repo);
        self.requests.lock().unwrap().push(request);
        if rejected {
            return Err("push rejected".into());
        }
        Ok(target)
    }
}

/// Code host that numbers pull requests per head ref, so a rerun for the
/// same branch finds the pull request it opened before.
#[derive(Default)]
pub struct FakeSource {
    pub fail_create: bool,
    pub fail_load: bool,
    pub opened: Mutex<HashMap<(String, String), i64>>,
    pub created: Mutex<Vec<NewChangeset>>,
    /// Metadata handed out by `load_changesets`, by external id.
    pub remote: Mutex<HashMap<String, ChangesetMetadata>>,
}

#[async_trait]
impl ChangesetSource for FakeSource {
    async fn create_changeset(
        &self,
        repo: &Repo,
        changeset: &NewChangeset,
    ) -> Result<CreatedChangeset, BoxError> {
        if self.fail_create {
            return Err("code host refused pull request".into());
        }
        self.created.lock().unwrap().push(changeset.clone());
        let mut opened = self.opened.lock().unwrap();
        let next = opened.len() as i64 + 1;
        let key = (repo.name.clone(), changeset.head_ref.clone());
        let already_existed = opened.contains_key(&key);
        let number = *opened.entry(key).or_insert(next);
        let mut pr = open_pull_request(number);
        pr.title = changeset.title.clone();
        pr.body = changeset.body.clone();
        pr.head_ref_name = changeset.head_ref.clone();
        pr.base_ref_name = changeset.base_ref.clone();
        Ok(CreatedChangeset {
            external_id: number.to_string(),
            metadata: ChangesetMetadata::GitHub(pr),
            already_existed,
        })
    }

    async fn load_changesets(&self, changesets: &mut [Changeset]) -> Result<(), BoxError> {
        if self.fail_load {
            return Err("rate limited".into());
        }
        let remote = self.remote.lock().unwrap();
        for changeset in changesets.iter_mut() {
            if let Some(metadata) = remote.get(&changeset.external_id) {
                changeset.metadata = metadata.clone();
            }
        }
        Ok(())
    }
}

pub struct FakeSources {
    pub source: Arc<FakeSource>,
    pub requested: Mutex<Vec<i64>>,
}

impl FakeSources {
    pub fn new(source: FakeSource) -> Arc<Self> {
        Arc::new(Self {
            source: Arc::new(source),
            requested: Mutex::new(Vec::new()),
        })
    }
}

impl SourceFactory for FakeSources {
    fn source_for(&self, service: &ExternalService) -> Result<Arc<dyn ChangesetSource>, BoxError> {
        self.requested.lock().unwrap().push(service.id);
        Ok(self.source.clone())
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Run a `fake` plan over `repos` to completion.
pub async fn run_plan(
    store: &MemoryStore,
    repos: Vec<Repo>,
    types: FakeCampaignTypes,
) -> CampaignPlan {
    let runner = PlanRunner::new(
        Arc::new(store.clone()),
        FakeSearch::returning(repos),
        Arc::new(FakeResolver::default()),
        Arc::new(types),
        PipelineConfig::default(),
    );
    runner
        .run("fake", serde_json::json!({}), Completion::Synchronous)
        .await
        .unwrap()
}
