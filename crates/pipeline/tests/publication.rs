//! Integration tests for changeset publication.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use armada_core::campaign::{Campaign, Namespace};
use armada_db::faults::FaultyStore;
use armada_db::{ListOptions, MemoryStore, Store};
use armada_pipeline::campaigns::{create_campaign, NewCampaign};
use armada_pipeline::publication::{
    branch_name, reset_failed_changeset_jobs, Publisher, DEFAULT_BASE_REF,
};
use common::{
    github_changeset, github_service, run_plan, seed_github, seed_repo, FakeCampaignTypes,
    FakeGit, FakeSource, FakeSources,
};

async fn campaign_for(store: &MemoryStore, names: &[&str]) -> Campaign {
    let (_, repos) = seed_github(store, names).await;
    let plan = run_plan(store, repos, FakeCampaignTypes::default()).await;
    create_campaign(
        store,
        NewCampaign {
            name: "Rename foo to bar".into(),
            description: "Automated rewrite".into(),
            author_id: 7,
            namespace: Namespace::Org(3),
            campaign_plan_id: Some(plan.id),
        },
    )
    .await
    .unwrap()
}

fn publisher(store: &MemoryStore, git: Arc<FakeGit>, sources: Arc<FakeSources>) -> Publisher {
    Publisher::new(Arc::new(store.clone()), git, sources)
}

fn faulty(store: &MemoryStore) -> FaultyStore {
    FaultyStore::new(Arc::new(store.clone()))
}

// ---------------------------------------------------------------------------
// Test: every job is pushed, opened and attached to the campaign
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publishes_every_job_of_a_campaign() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a", "acme/b"]).await;
    let git = Arc::new(FakeGit::default());
    let sources = FakeSources::new(FakeSource::default());

    publisher(&store, git.clone(), sources.clone())
        .run_changeset_jobs(campaign.id)
        .await
        .unwrap();

    let requests = git.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        assert_eq!(request.target_ref, format!("refs/heads/{}", branch_name(campaign.id)));
        assert!(request.patch.ends_with('\n'));
        assert_eq!(request.git_apply_args, vec!["-p0".to_string()]);
        assert!(request.push);
        assert!(request.commit_info.message.starts_with("Rename foo to bar"));
    }
    for created in sources.source.created.lock().unwrap().iter() {
        assert_eq!(created.title, "Rename foo to bar");
        assert_eq!(created.body, "Automated rewrite");
        assert_eq!(created.base_ref, "refs/heads/main");
    }

    let jobs = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    assert!(jobs.iter().all(|j| j.is_published() && j.is_finished() && j.error.is_empty()));

    let campaign = store.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.changeset_ids.len(), 2);
    for id in &campaign.changeset_ids {
        let changeset = store.get_changeset(*id).await.unwrap();
        assert!(changeset.campaign_ids.contains(&campaign.id));
        assert_eq!(changeset.external_service_type, "github");
    }
}

// ---------------------------------------------------------------------------
// Test: a failed push is recorded and does not stop the batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_is_recorded_and_siblings_still_publish() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a", "acme/rejected"]).await;
    let git = Arc::new(FakeGit {
        reject: HashSet::from(["acme/rejected".to_string()]),
        ..Default::default()
    });
    let sources = FakeSources::new(FakeSource::default());

    let err = publisher(&store, git, sources)
        .run_changeset_jobs(campaign.id)
        .await
        .unwrap_err();

    assert_eq!(err.len(), 1);
    assert!(err.to_string().contains("push rejected"));

    let jobs = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    let failed: Vec<_> = jobs.iter().filter(|j| j.is_failed()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].changeset_id, 0);
    assert!(failed[0].finished_at.is_some());
    assert_eq!(jobs.iter().filter(|j| j.is_published()).count(), 1);

    let campaign = store.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.changeset_ids.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: reset touches failed jobs only, and a rerun publishes them
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_failed_jobs_allows_a_rerun() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a", "acme/rejected"]).await;
    let flaky = Arc::new(FakeGit {
        reject: HashSet::from(["acme/rejected".to_string()]),
        ..Default::default()
    });
    let sources = FakeSources::new(FakeSource::default());
    let _ = publisher(&store, flaky, sources.clone())
        .run_changeset_jobs(campaign.id)
        .await;

    let before = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    let published_before = before.iter().find(|j| j.is_published()).unwrap().clone();

    let reset = reset_failed_changeset_jobs(&store, campaign.id).await.unwrap();
    assert_eq!(reset, 1);

    let after = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    let untouched = after.iter().find(|j| j.id == published_before.id).unwrap();
    assert_eq!(untouched, &published_before);
    let cleared = after.iter().find(|j| j.id != published_before.id).unwrap();
    assert!(cleared.error.is_empty());
    assert!(cleared.started_at.is_none());
    assert!(cleared.finished_at.is_none());

    publisher(&store, Arc::new(FakeGit::default()), sources)
        .run_changeset_jobs(campaign.id)
        .await
        .unwrap();
    let campaign = store.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.changeset_ids.len(), 2);
}

// ---------------------------------------------------------------------------
// Test: a changeset already stored for the same pull request is reused
// ---------------------------------------------------------------------------

#[tokio::test]
async fn existing_changeset_row_is_reused() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let jobs = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    let mut campaign_job = store.get_campaign_job(jobs[0].campaign_job_id).await.unwrap();
    let existing = store
        .create_changeset(github_changeset(campaign_job.repo_id, 1))
        .await
        .unwrap();
    campaign_job.base_ref = String::new();
    store.update_campaign_job(&campaign_job).await.unwrap();

    let sources = FakeSources::new(FakeSource::default());
    let job = publisher(&store, Arc::new(FakeGit::default()), sources.clone())
        .run_changeset_job(jobs[0].clone())
        .await
        .unwrap();

    assert_eq!(job.changeset_id, existing.id);
    let all = store.list_changesets(ListOptions::all()).await.unwrap().items;
    assert_eq!(all.len(), 1);
    assert!(all[0].campaign_ids.contains(&campaign.id));
    assert_eq!(
        sources.source.created.lock().unwrap()[0].base_ref,
        DEFAULT_BASE_REF
    );
}

// ---------------------------------------------------------------------------
// Test: a published job is never pushed again
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_job_is_not_republished() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let git = Arc::new(FakeGit::default());
    let publisher = publisher(&store, git.clone(), FakeSources::new(FakeSource::default()));

    let job = store.claim_next_pending_changeset_job().await.unwrap().unwrap();
    let job = publisher.run_changeset_job(job).await.unwrap();
    assert!(job.is_published());

    let again = publisher.run_changeset_job(job.clone()).await.unwrap();
    assert_eq!(again, job);
    assert_eq!(git.requests.lock().unwrap().len(), 1);

    let campaign = store.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.changeset_ids.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: a repository without a credentialed connection fails its job
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_credentials_fail_the_job() {
    let store = MemoryStore::new();
    let anonymous = store
        .insert_external_service(github_service(None))
        .await
        .unwrap();
    let repo = seed_repo(&store, "acme/readonly", vec![anonymous.id]).await;
    let plan = run_plan(&store, vec![repo], FakeCampaignTypes::default()).await;
    let campaign = create_campaign(
        &store,
        NewCampaign {
            name: "Read only".into(),
            description: String::new(),
            author_id: 1,
            namespace: Namespace::User(1),
            campaign_plan_id: Some(plan.id),
        },
    )
    .await
    .unwrap();

    let err = publisher(
        &store,
        Arc::new(FakeGit::default()),
        FakeSources::new(FakeSource::default()),
    )
    .run_changeset_jobs(campaign.id)
    .await
    .unwrap_err();

    assert!(err.to_string().contains("no credentialed code-host connection"));
}

// ---------------------------------------------------------------------------
// Test: a job claimed by a worker is not published again by a batch run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn claimed_job_is_skipped_by_batch_run() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let git = Arc::new(FakeGit::default());
    let sources = FakeSources::new(FakeSource::default());
    let publisher = publisher(&store, git.clone(), sources.clone());

    let claimed = store.claim_next_pending_changeset_job().await.unwrap().unwrap();
    publisher.run_changeset_jobs(campaign.id).await.unwrap();
    assert!(git.requests.lock().unwrap().is_empty());

    let job = publisher.run_changeset_job(claimed.clone()).await.unwrap();
    assert!(job.is_published());

    // A stale copy of the claimed row is answered with the stored row.
    let again = publisher.run_changeset_job(claimed).await.unwrap();
    assert_eq!(again, job);
    assert_eq!(git.requests.lock().unwrap().len(), 1);
    assert_eq!(sources.source.created.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: an unstarted copy of a job published meanwhile is not pushed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_unstarted_copy_is_not_republished() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let git = Arc::new(FakeGit::default());
    let publisher = publisher(&store, git.clone(), FakeSources::new(FakeSource::default()));
    let listed = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;

    publisher.run_changeset_jobs(campaign.id).await.unwrap();
    let stale = publisher.run_changeset_job(listed[0].clone()).await.unwrap();

    assert!(stale.is_published());
    assert_eq!(git.requests.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: concurrent batch runs publish each job exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_batch_runs_publish_each_job_once() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a", "acme/b", "acme/c"]).await;
    let git = Arc::new(FakeGit::default());
    let sources = FakeSources::new(FakeSource::default());
    let first = publisher(&store, git.clone(), sources.clone());
    let second = publisher(&store, git.clone(), sources.clone());

    let (a, b) = tokio::join!(
        first.run_changeset_jobs(campaign.id),
        second.run_changeset_jobs(campaign.id)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(git.requests.lock().unwrap().len(), 3);
    assert_eq!(sources.source.created.lock().unwrap().len(), 3);
    let campaign = store.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.changeset_ids.len(), 3);
}

// ---------------------------------------------------------------------------
// Test: a failed attach transaction leaves the job unpublished and retryable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_attach_leaves_job_unpublished() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let faulty = faulty(&store);
    faulty.fail("update_campaign", 1);
    let sources = FakeSources::new(FakeSource::default());
    let publisher = Publisher::new(
        Arc::new(faulty),
        Arc::new(FakeGit::default()),
        sources.clone(),
    );

    let err = publisher.run_changeset_jobs(campaign.id).await.unwrap_err();
    assert!(err.to_string().contains("injected failure in update_campaign"));

    let jobs = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    assert_eq!(jobs[0].changeset_id, 0);
    assert!(jobs[0].is_failed());
    assert!(store.list_changesets(ListOptions::all()).await.unwrap().items.is_empty());
    assert!(store
        .get_campaign(campaign.id)
        .await
        .unwrap()
        .changeset_ids
        .is_empty());

    assert_eq!(reset_failed_changeset_jobs(&store, campaign.id).await.unwrap(), 1);
    publisher.run_changeset_jobs(campaign.id).await.unwrap();

    let job = store.get_changeset_job(jobs[0].id).await.unwrap();
    assert!(job.is_published());
    let campaign = store.get_campaign(campaign.id).await.unwrap();
    assert_eq!(campaign.changeset_ids.len(), 1);
    assert!(campaign.changeset_ids.contains(&job.changeset_id));
}

// ---------------------------------------------------------------------------
// Test: recording the outcome survives transient store errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outcome_is_recorded_after_transient_store_errors() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let faulty = faulty(&store);
    // The first write attaches the changeset; the next two record the outcome.
    faulty.fail_after("update_changeset_job", 1, 2);
    let publisher = Publisher::new(
        Arc::new(faulty),
        Arc::new(FakeGit::default()),
        FakeSources::new(FakeSource::default()),
    );

    publisher.run_changeset_jobs(campaign.id).await.unwrap();

    let jobs = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items;
    assert!(jobs[0].is_published());
    assert!(jobs[0].is_finished());
    assert!(jobs[0].error.is_empty());
}

// ---------------------------------------------------------------------------
// Test: an unrecorded outcome still keeps the published job from rerunning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unrecorded_outcome_is_not_republished() {
    let store = MemoryStore::new();
    let campaign = campaign_for(&store, &["acme/a"]).await;
    let faulty = faulty(&store);
    faulty.fail_after("update_changeset_job", 1, 3);
    let git = Arc::new(FakeGit::default());
    let publisher = Publisher::new(
        Arc::new(faulty),
        git.clone(),
        FakeSources::new(FakeSource::default()),
    );

    let err = publisher.run_changeset_jobs(campaign.id).await.unwrap_err();
    assert!(err.to_string().contains("injected failure in update_changeset_job"));

    let job = store
        .list_changeset_jobs(campaign.id, ListOptions::all())
        .await
        .unwrap()
        .items
        .remove(0);
    assert!(job.is_published());
    assert!(store.claim_changeset_job(job.id).await.unwrap().is_none());

    publisher.run_changeset_jobs(campaign.id).await.unwrap();
    assert_eq!(git.requests.lock().unwrap().len(), 1);
}
