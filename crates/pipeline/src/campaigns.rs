//! Campaign creation and membership.

use std::collections::BTreeSet;

use armada_core::campaign::{Campaign, ChangesetJob, Namespace};
use armada_core::types::DbId;
use armada_db::{finish, ListOptions, Store, StoreError};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCampaign {
    pub name: String,
    pub description: String,
    pub author_id: DbId,
    pub namespace: Namespace,
    pub campaign_plan_id: Option<DbId>,
}

#[derive(Debug, thiserror::Error)]
pub enum CampaignError {
    #[error("campaign name must not be blank")]
    BlankName,

    #[error("invalid namespace id {0}")]
    InvalidNamespace(DbId),

    #[error("campaign plan {0} was canceled")]
    PlanCanceled(DbId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a campaign. When it is built from a plan, every finished job of
/// that plan with a diff gets one pending [`ChangesetJob`].
pub async fn create_campaign(store: &dyn Store, new: NewCampaign) -> Result<Campaign, CampaignError> {
    if new.name.trim().is_empty() {
        return Err(CampaignError::BlankName);
    }
    if new.namespace.id() <= 0 {
        return Err(CampaignError::InvalidNamespace(new.namespace.id()));
    }

    let tx = store.transact().await?;
    let result = create_in(tx.as_ref(), new).await;
    let campaign = finish(tx.as_ref(), result).await?;
    tracing::info!(campaign_id = campaign.id, "Campaign created");
    Ok(campaign)
}

async fn create_in(tx: &dyn Store, new: NewCampaign) -> Result<Campaign, CampaignError> {
    if let Some(plan_id) = new.campaign_plan_id {
        let plan = tx.get_campaign_plan(plan_id).await?;
        if plan.is_canceled() {
            return Err(CampaignError::PlanCanceled(plan_id));
        }
    }

    let now = Utc::now();
    let campaign = tx
        .create_campaign(Campaign {
            id: 0,
            name: new.name.trim().to_string(),
            description: new.description,
            author_id: new.author_id,
            namespace: new.namespace,
            changeset_ids: BTreeSet::new(),
            campaign_plan_id: new.campaign_plan_id,
            closed_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let Some(plan_id) = campaign.campaign_plan_id else {
        return Ok(campaign);
    };
    let jobs = tx.list_campaign_jobs(plan_id, ListOptions::all()).await?.items;
    for job in jobs.iter().filter(|j| j.has_diff()) {
        tx.create_changeset_job(ChangesetJob {
            id: 0,
            campaign_id: campaign.id,
            campaign_job_id: job.id,
            changeset_id: 0,
            error: String::new(),
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;
    }
    Ok(campaign)
}

/// Stamp `closed_at`; closing twice keeps the first timestamp.
pub async fn close_campaign(store: &dyn Store, campaign_id: DbId) -> Result<Campaign, StoreError> {
    let mut campaign = store.get_campaign(campaign_id).await?;
    if campaign.is_closed() {
        return Ok(campaign);
    }
    campaign.closed_at = Some(Utc::now());
    store.update_campaign(&campaign).await
}

/// Attach existing changesets to a campaign, on both sides of the
/// relation. Ids already attached are left alone.
pub async fn add_changesets_to_campaign(
    store: &dyn Store,
    campaign_id: DbId,
    changeset_ids: &[DbId],
) -> Result<Campaign, StoreError> {
    let tx = store.transact().await?;
    let result = async {
        let mut campaign = tx.get_campaign(campaign_id).await?;
        let mut changesets = Vec::with_capacity(changeset_ids.len());
        for &id in changeset_ids {
            let mut changeset = tx.get_changeset(id).await?;
            changeset.add_campaign(campaign_id);
            changesets.push(changeset);
            campaign.add_changeset(id);
        }
        tx.update_changesets(&changesets).await?;
        tx.update_campaign(&campaign).await
    }
    .await;
    finish(tx.as_ref(), result).await
}
