//! Repositories and the code-host connections that serve them.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Kind of code host behind an external service connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalServiceKind {
    #[serde(rename = "GITHUB")]
    GitHub,
    #[serde(rename = "BITBUCKETSERVER")]
    BitbucketServer,
}

impl ExternalServiceKind {
    /// The external service type recorded on changesets and repositories.
    pub fn service_type(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::BitbucketServer => "bitbucketServer",
        }
    }

    pub fn from_service_type(service_type: &str) -> Option<Self> {
        match service_type {
            "github" => Some(Self::GitHub),
            "bitbucketServer" => Some(Self::BitbucketServer),
            _ => None,
        }
    }
}

/// One configured webhook secret.
///
/// GitHub connections may scope a secret to an organization; the field is
/// informational only, every secret of a connection is a verification
/// candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSecret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    pub secret: String,
}

/// Connection settings for one code host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalServiceConfig {
    pub url: String,
    /// API token; a connection without one cannot publish changesets.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub webhooks: Vec<WebhookSecret>,
}

/// A configured code-host connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalService {
    pub id: DbId,
    pub kind: ExternalServiceKind,
    pub display_name: String,
    pub config: ExternalServiceConfig,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ExternalService {
    /// Whether this connection carries credentials usable for writes.
    pub fn is_credentialed(&self) -> bool {
        self.config
            .token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    /// Every non-blank webhook secret configured on this connection.
    pub fn webhook_secrets(&self) -> impl Iterator<Item = &str> {
        self.config
            .webhooks
            .iter()
            .map(|w| w.secret.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// A repository known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: DbId,
    /// Canonical name, e.g. `github.com/org/project`.
    pub name: String,
    pub kind: ExternalServiceKind,
    /// Connections through which this repository is reachable, in
    /// preference order.
    pub external_service_ids: Vec<DbId>,
}

/// Pick the first connection that can publish, preserving the order of
/// `services`.
pub fn first_credentialed(services: &[ExternalService]) -> Option<&ExternalService> {
    services.iter().find(|svc| svc.is_credentialed())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn service(id: DbId, token: Option<&str>) -> ExternalService {
        ExternalService {
            id,
            kind: ExternalServiceKind::GitHub,
            display_name: format!("svc-{id}"),
            config: ExternalServiceConfig {
                url: "https://github.com".into(),
                token: token.map(str::to_string),
                webhooks: vec![
                    WebhookSecret {
                        org: None,
                        secret: "s3cret".into(),
                    },
                    WebhookSecret {
                        org: Some("acme".into()),
                        secret: String::new(),
                    },
                ],
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn service_type_round_trips() {
        for kind in [ExternalServiceKind::GitHub, ExternalServiceKind::BitbucketServer] {
            assert_eq!(
                ExternalServiceKind::from_service_type(kind.service_type()),
                Some(kind)
            );
        }
        assert_eq!(ExternalServiceKind::from_service_type("gitlab"), None);
    }

    #[test]
    fn blank_token_is_not_credentialed() {
        assert!(!service(1, Some("  ")).is_credentialed());
        assert!(!service(1, None).is_credentialed());
        assert!(service(1, Some("tok")).is_credentialed());
    }

    #[test]
    fn first_credentialed_wins() {
        let services = vec![service(1, None), service(2, Some("a")), service(3, Some("b"))];
        assert_eq!(first_credentialed(&services).map(|s| s.id), Some(2));
    }

    #[test]
    fn blank_webhook_secrets_are_skipped() {
        let svc = service(1, None);
        assert_eq!(svc.webhook_secrets().collect::<Vec<_>>(), vec!["s3cret"]);
    }
}
