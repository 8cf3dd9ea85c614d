//! Scrub committed credentials.
//!
//! Each matcher names a credential format; its rewrite replaces the literal
//! secret with a reference to an environment variable.

use armada_core::repo::Repo;
use async_trait::async_trait;
use serde::Deserialize;

use super::{CampaignType, CampaignTypeError, GeneratedDiff, ReplacerClient, RewriteSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherType {
    Npm,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Matcher {
    #[serde(rename = "type")]
    pub matcher_type: MatcherType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsArgs {
    pub scope_query: String,
    pub matchers: Vec<Matcher>,
}

impl MatcherType {
    fn search_term(self) -> &'static str {
        match self {
            Self::Npm => "file:\\.npmrc$ _authToken",
        }
    }

    fn rewrite(self) -> RewriteSpec {
        match self {
            Self::Npm => RewriteSpec {
                match_template: "_authToken=:[token~[^\\s$]\\S*]".into(),
                rewrite_template: "_authToken=${NPM_TOKEN}".into(),
                file_extension: ".npmrc".into(),
            },
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Npm => "npm",
        }
    }
}

pub struct Credentials {
    args: CredentialsArgs,
    replacer: ReplacerClient,
}

impl Credentials {
    pub fn new(args: CredentialsArgs, replacer: ReplacerClient) -> Self {
        Self { args, replacer }
    }
}

#[async_trait]
impl CampaignType for Credentials {
    fn search_query(&self) -> String {
        let terms: Vec<&str> = self
            .args
            .matchers
            .iter()
            .map(|m| m.matcher_type.search_term())
            .collect();
        format!("{} {}", self.args.scope_query, terms.join(" or "))
    }

    async fn generate_diff(
        &self,
        repo: &Repo,
        commit: &str,
    ) -> Result<GeneratedDiff, CampaignTypeError> {
        let mut diff = String::new();
        let mut labels = Vec::new();
        for matcher in &self.args.matchers {
            let kind = matcher.matcher_type;
            let part = self.replacer.replace(&repo.name, commit, &kind.rewrite()).await?;
            if !part.is_empty() {
                diff.push_str(&part);
                labels.push(kind.label());
            }
        }
        let description = if labels.is_empty() {
            String::new()
        } else {
            format!("Replace committed {} credentials with environment variables", labels.join(", "))
        };
        Ok(GeneratedDiff { diff, description })
    }
}
