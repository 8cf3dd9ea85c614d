//! Structural search-and-replace.

use armada_core::repo::Repo;
use async_trait::async_trait;
use serde::Deserialize;

use super::{CampaignType, CampaignTypeError, GeneratedDiff, ReplacerClient, RewriteSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombyArgs {
    pub scope_query: String,
    pub match_template: String,
    pub rewrite_template: String,
}

pub struct Comby {
    args: CombyArgs,
    replacer: ReplacerClient,
}

impl Comby {
    pub fn new(args: CombyArgs, replacer: ReplacerClient) -> Self {
        Self { args, replacer }
    }
}

#[async_trait]
impl CampaignType for Comby {
    fn search_query(&self) -> String {
        format!(
            "{} patterntype:structural {}",
            self.args.scope_query, self.args.match_template
        )
    }

    async fn generate_diff(
        &self,
        repo: &Repo,
        commit: &str,
    ) -> Result<GeneratedDiff, CampaignTypeError> {
        let spec = RewriteSpec {
            match_template: self.args.match_template.clone(),
            rewrite_template: self.args.rewrite_template.clone(),
            file_extension: String::new(),
        };
        let diff = self.replacer.replace(&repo.name, commit, &spec).await?;
        Ok(GeneratedDiff {
            diff,
            description: format!(
                "Rewrite `{}` to `{}`",
                self.args.match_template, self.args.rewrite_template
            ),
        })
    }
}
