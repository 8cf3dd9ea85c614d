//! HTTP client for the replacer diff backend.
//!
//! The backend rewrites every matching file of one repository at one commit
//! and streams the result as newline-delimited JSON, one `{uri, diff}`
//! record per changed file.

use std::time::Duration;

use serde::Deserialize;

/// One structural rewrite to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteSpec {
    pub match_template: String,
    pub rewrite_template: String,
    /// Restrict the rewrite to files with this extension; empty for all.
    pub file_extension: String,
}

#[derive(Debug, Deserialize)]
struct FileDiff {
    uri: String,
    diff: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplacerError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("replacer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("replacer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed replacer output on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub struct ReplacerClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReplacerClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ReplacerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Apply `spec` to `repo` at `commit` and return the combined diff.
    pub async fn replace(
        &self,
        repo: &str,
        commit: &str,
        spec: &RewriteSpec,
    ) -> Result<String, ReplacerError> {
        let response = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[
                ("repo", repo),
                ("commit", commit),
                ("matchtemplate", spec.match_template.as_str()),
                ("rewritetemplate", spec.rewrite_template.as_str()),
                ("fileextension", spec.file_extension.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ReplacerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_diffs(&body)
    }
}

/// Concatenate the per-file diffs of a newline-delimited response.
fn parse_diffs(body: &str) -> Result<String, ReplacerError> {
    let mut combined = String::new();
    for (idx, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let file: FileDiff = serde_json::from_str(line).map_err(|source| ReplacerError::Decode {
            line: idx + 1,
            source,
        })?;
        tracing::trace!(uri = %file.uri, "Replacer rewrote file");
        combined.push_str(&file.diff);
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
    }
    Ok(combined)
}
