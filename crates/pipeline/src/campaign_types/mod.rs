//! Campaign types: pluggable diff generators.
//!
//! A campaign type is built once per plan from its name and JSON
//! arguments, validated against the type's schema before anything else
//! happens, and then invoked concurrently for every repository the plan
//! covers.

use std::sync::Arc;

use armada_core::error::MultiError;
use armada_core::repo::Repo;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::PipelineConfig;

pub mod comby;
pub mod credentials;
pub mod replacer;
pub mod schema;

pub use replacer::{ReplacerClient, ReplacerError, RewriteSpec};

/// Result of one repository's diff generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedDiff {
    /// Unified diff without `a/`/`b/` prefixes; empty when nothing changed.
    pub diff: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CampaignTypeError {
    #[error(
        "patch campaigns bypass repository search; create them from a patch set \
         instead of a campaign plan"
    )]
    PatchNotSupported,

    #[error("unknown campaign type {0:?}")]
    Unknown(String),

    #[error("invalid arguments for campaign type {campaign_type}: {errors}")]
    InvalidArguments {
        campaign_type: String,
        errors: MultiError,
    },

    #[error("malformed arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    /// An embedded schema failed to compile.
    #[error("broken argument schema: {0}")]
    Schema(String),

    #[error(transparent)]
    Replacer(#[from] ReplacerError),
}

/// Supplies the repositories a plan covers and the diff for each of them.
///
/// Implementations are shared across concurrently running diff tasks.
#[async_trait]
pub trait CampaignType: Send + Sync {
    /// Repository search query selecting the repositories to change.
    fn search_query(&self) -> String;

    /// Produce the diff for `repo` at `commit`.
    async fn generate_diff(&self, repo: &Repo, commit: &str)
        -> Result<GeneratedDiff, CampaignTypeError>;
}

/// Builds campaign types by name. The plan runner goes through this seam so
/// that embedders can register their own types.
pub trait CampaignTypes: Send + Sync {
    fn build(&self, name: &str, arguments: &Value) -> Result<Arc<dyn CampaignType>, CampaignTypeError>;
}

/// The types shipped with this crate, backed by the replacer service.
#[derive(Debug, Clone)]
pub struct BuiltinCampaignTypes {
    config: PipelineConfig,
}

impl BuiltinCampaignTypes {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl CampaignTypes for BuiltinCampaignTypes {
    fn build(&self, name: &str, arguments: &Value) -> Result<Arc<dyn CampaignType>, CampaignTypeError> {
        new_campaign_type(name, arguments, &self.config)
    }
}

/// Build the campaign type `name` from `arguments`.
///
/// Fails before any diff is generated when the name is unknown, names the
/// patch type, or the arguments violate the type's schema.
pub fn new_campaign_type(
    name: &str,
    arguments: &Value,
    config: &PipelineConfig,
) -> Result<Arc<dyn CampaignType>, CampaignTypeError> {
    let name = name.trim().to_ascii_lowercase();
    if name == "patch" {
        return Err(CampaignTypeError::PatchNotSupported);
    }
    schema::validate_arguments(&name, arguments)?;

    let replacer = ReplacerClient::new(&config.replacer_url, config.diff_fetch_timeout)?;
    match name.as_str() {
        "comby" => Ok(Arc::new(comby::Comby::new(
            serde_json::from_value(arguments.clone())?,
            replacer,
        ))),
        "credentials" => Ok(Arc::new(credentials::Credentials::new(
            serde_json::from_value(arguments.clone())?,
            replacer,
        ))),
        _ => Err(CampaignTypeError::Unknown(name)),
    }
}
