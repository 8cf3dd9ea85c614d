//! GitHub webhook payloads.
//!
//! Deliveries use the REST API's snake_case shapes; they are converted into
//! the GraphQL-shaped timeline items sync stores, so both paths produce the
//! same deduplication keys.

use armada_core::events::{ChangesetEventKind, EventMetadata};
use armada_core::github::{
    Actor, AssignmentEvent, ClosedEvent, IssueComment, MergedEvent, PullRequestReview,
    PullRequestReviewComment, ReopenedEvent, RenamedTitleEvent, ReviewDismissedEvent,
    ReviewRequestEvent,
};
use armada_core::types::Timestamp;
use serde::Deserialize;

use super::WebhookEvent;

/// Header naming the event type.
pub const EVENT_HEADER: &str = "x-github-event";
/// Header carrying `sha256=<hex hmac>` of the body.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Event types accepted without producing an event.
const IGNORED_EVENTS: &[&str] = &[
    "ping",
    "push",
    "status",
    "check_run",
    "check_suite",
    "create",
    "delete",
];

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported GitHub event {0:?}")]
    UnknownEvent(String),

    #[error("malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct User {
    login: String,
    avatar_url: String,
    html_url: String,
}

impl From<User> for Actor {
    fn from(user: User) -> Self {
        Actor {
            login: user.login,
            avatar_url: user.avatar_url,
            url: user.html_url,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BaseRef {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    merged: bool,
    merged_at: Option<Timestamp>,
    closed_at: Option<Timestamp>,
    updated_at: Option<Timestamp>,
    merge_commit_sha: Option<String>,
    #[serde(default)]
    base: BaseRef,
}

#[derive(Debug, Deserialize)]
struct TitleChange {
    from: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Changes {
    title: Option<TitleChange>,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    pull_request: PullRequest,
    #[serde(default)]
    sender: User,
    assignee: Option<User>,
    requested_reviewer: Option<User>,
    #[serde(default)]
    changes: Changes,
}

#[derive(Debug, Deserialize)]
struct Review {
    id: i64,
    #[serde(default)]
    user: User,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    commit_id: String,
    #[serde(default)]
    author_association: String,
    submitted_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    action: String,
    review: Review,
    pull_request: PullRequest,
    #[serde(default)]
    sender: User,
}

#[derive(Debug, Deserialize)]
struct Comment {
    id: i64,
    #[serde(default)]
    user: User,
    #[serde(default)]
    body: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    commit_id: String,
    #[serde(default)]
    author_association: String,
    created_at: Option<Timestamp>,
    updated_at: Option<Timestamp>,
}

#[derive(Debug, Deserialize)]
struct ReviewCommentPayload {
    action: String,
    comment: Comment,
    pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: i64,
    /// Present only when the issue is a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct IssueCommentPayload {
    action: String,
    issue: Issue,
    comment: Comment,
    #[serde(default)]
    sender: User,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Convert one delivery. `Ok(None)` means the delivery is valid but carries
/// nothing worth recording.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<Option<WebhookEvent>, ParseError> {
    let decode_err = |source| ParseError::Payload {
        event: event_type.to_string(),
        source,
    };
    match event_type {
        "pull_request" => Ok(pull_request_event(
            serde_json::from_slice(body).map_err(decode_err)?,
        )),
        "pull_request_review" => Ok(review_event(
            serde_json::from_slice(body).map_err(decode_err)?,
        )),
        "pull_request_review_comment" => Ok(review_comment_event(
            serde_json::from_slice(body).map_err(decode_err)?,
        )),
        "issue_comment" => Ok(issue_comment_event(
            serde_json::from_slice(body).map_err(decode_err)?,
        )),
        other if IGNORED_EVENTS.contains(&other) => Ok(None),
        other => Err(ParseError::UnknownEvent(other.to_string())),
    }
}

fn event(number: i64, kind: ChangesetEventKind, metadata: EventMetadata) -> Option<WebhookEvent> {
    Some(WebhookEvent {
        external_ids: vec![number.to_string()],
        kind,
        metadata,
    })
}

fn pull_request_event(payload: PullRequestPayload) -> Option<WebhookEvent> {
    use ChangesetEventKind as K;
    use EventMetadata as M;

    let pr = payload.pull_request;
    let actor = Actor::from(payload.sender);
    match payload.action.as_str() {
        "closed" if pr.merged => event(
            pr.number,
            K::GitHubMerged,
            M::GitHubMerged(MergedEvent {
                actor,
                merge_ref_name: pr.base.name,
                url: pr.html_url,
                commit_oid: pr.merge_commit_sha.unwrap_or_default(),
                created_at: pr.merged_at,
            }),
        ),
        "closed" => event(
            pr.number,
            K::GitHubClosed,
            M::GitHubClosed(ClosedEvent {
                actor,
                url: pr.html_url,
                created_at: pr.closed_at,
            }),
        ),
        "reopened" => event(
            pr.number,
            K::GitHubReopened,
            M::GitHubReopened(ReopenedEvent {
                actor,
                created_at: pr.updated_at,
            }),
        ),
        action @ ("assigned" | "unassigned") => {
            let kind = if action == "assigned" {
                K::GitHubAssigned
            } else {
                K::GitHubUnassigned
            };
            event(
                pr.number,
                kind,
                M::GitHubAssignment(AssignmentEvent {
                    actor,
                    assignee: payload.assignee.map(Actor::from).unwrap_or_default(),
                    created_at: pr.updated_at,
                }),
            )
        }
        action @ ("review_requested" | "review_request_removed") => {
            let kind = if action == "review_requested" {
                K::GitHubReviewRequested
            } else {
                K::GitHubReviewRequestRemoved
            };
            event(
                pr.number,
                kind,
                M::GitHubReviewRequest(ReviewRequestEvent {
                    actor,
                    requested_reviewer: payload
                        .requested_reviewer
                        .map(Actor::from)
                        .unwrap_or_default(),
                    created_at: pr.updated_at,
                }),
            )
        }
        "edited" => {
            let change = payload.changes.title?;
            event(
                pr.number,
                K::GitHubRenamedTitle,
                M::GitHubRenamedTitle(RenamedTitleEvent {
                    actor,
                    previous_title: change.from,
                    current_title: pr.title,
                    created_at: pr.updated_at,
                }),
            )
        }
        _ => None,
    }
}

fn review_event(payload: ReviewPayload) -> Option<WebhookEvent> {
    let number = payload.pull_request.number;
    let updated_at = payload.pull_request.updated_at;
    let action = payload.action;
    let review = payload.review;
    let converted = PullRequestReview {
        database_id: review.id,
        author: review.user.into(),
        author_association: review.author_association,
        body: review.body.unwrap_or_default(),
        state: review.state.to_ascii_uppercase(),
        url: review.html_url,
        commit_oid: review.commit_id,
        created_at: review.submitted_at,
        updated_at: review.submitted_at,
        includes_created_edit: action == "edited",
    };

    match action.as_str() {
        "submitted" | "edited" => event(
            number,
            ChangesetEventKind::GitHubReviewed,
            EventMetadata::GitHubReview(converted),
        ),
        "dismissed" => event(
            number,
            ChangesetEventKind::GitHubReviewDismissed,
            EventMetadata::GitHubReviewDismissed(ReviewDismissedEvent {
                actor: payload.sender.into(),
                review: converted,
                dismissal_message: String::new(),
                created_at: updated_at,
            }),
        ),
        _ => None,
    }
}

fn review_comment_event(payload: ReviewCommentPayload) -> Option<WebhookEvent> {
    if !matches!(payload.action.as_str(), "created" | "edited") {
        return None;
    }
    let comment = payload.comment;
    event(
        payload.pull_request.number,
        ChangesetEventKind::GitHubReviewCommented,
        EventMetadata::GitHubReviewComment(PullRequestReviewComment {
            database_id: comment.id,
            author: comment.user.into(),
            author_association: comment.author_association,
            body: comment.body,
            url: comment.html_url,
            commit_oid: comment.commit_id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            includes_created_edit: payload.action == "edited",
        }),
    )
}

fn issue_comment_event(payload: IssueCommentPayload) -> Option<WebhookEvent> {
    // Comments on plain issues share this event type.
    payload.issue.pull_request.as_ref()?;
    if !matches!(payload.action.as_str(), "created" | "edited") {
        return None;
    }
    let edited = payload.action == "edited";
    let comment = payload.comment;
    event(
        payload.issue.number,
        ChangesetEventKind::GitHubCommented,
        EventMetadata::GitHubComment(IssueComment {
            database_id: comment.id,
            author: comment.user.into(),
            editor: edited.then(|| payload.sender.into()),
            author_association: comment.author_association,
            body: comment.body,
            url: comment.html_url,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            includes_created_edit: edited,
        }),
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn pr(number: i64) -> serde_json::Value {
        json!({
            "number": number,
            "title": "Rename foo",
            "html_url": format!("https://github.com/acme/a/pull/{number}"),
            "merged": false,
            "updated_at": "2020-01-02T10:00:00Z",
            "base": {"ref": "main"}
        })
    }

    fn parse(event_type: &str, body: serde_json::Value) -> Option<WebhookEvent> {
        parse_event(event_type, body.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn closed_and_merged_pull_request_is_a_merge() {
        let mut pull = pr(5);
        pull["merged"] = json!(true);
        pull["merged_at"] = json!("2020-01-03T00:00:00Z");
        let event = parse(
            "pull_request",
            json!({"action": "closed", "pull_request": pull, "sender": {"login": "alice"}}),
        )
        .unwrap();

        assert_eq!(event.external_ids, vec!["5"]);
        assert_eq!(event.kind, ChangesetEventKind::GitHubMerged);
        assert_matches!(
            event.metadata,
            EventMetadata::GitHubMerged(ref m) if m.merge_ref_name == "main" && m.actor.login == "alice"
        );
    }

    #[test]
    fn submitted_review_uppercases_state() {
        let event = parse(
            "pull_request_review",
            json!({
                "action": "submitted",
                "review": {
                    "id": 77,
                    "user": {"login": "bob"},
                    "state": "approved",
                    "submitted_at": "2020-01-02T10:00:00Z"
                },
                "pull_request": pr(5)
            }),
        )
        .unwrap();

        assert_eq!(event.kind, ChangesetEventKind::GitHubReviewed);
        assert_eq!(event.metadata.key(), "77");
        assert_matches!(event.metadata, EventMetadata::GitHubReview(ref r) if r.state == "APPROVED");
    }

    #[test]
    fn title_edit_becomes_rename() {
        let event = parse(
            "pull_request",
            json!({
                "action": "edited",
                "pull_request": pr(5),
                "sender": {"login": "alice"},
                "changes": {"title": {"from": "Old"}}
            }),
        )
        .unwrap();

        assert_matches!(
            event.metadata,
            EventMetadata::GitHubRenamedTitle(ref r)
                if r.previous_title == "Old" && r.current_title == "Rename foo"
        );
    }

    #[test]
    fn body_edit_is_ignored() {
        assert!(parse(
            "pull_request",
            json!({"action": "edited", "pull_request": pr(5), "changes": {"body": {"from": "x"}}}),
        )
        .is_none());
    }

    #[test]
    fn issue_comment_on_plain_issue_is_ignored() {
        assert!(parse(
            "issue_comment",
            json!({
                "action": "created",
                "issue": {"number": 9},
                "comment": {"id": 1, "body": "hi"}
            }),
        )
        .is_none());
    }

    #[test]
    fn ping_is_a_no_op() {
        assert!(parse("ping", json!({"zen": "Keep it logically awesome."})).is_none());
    }

    #[test]
    fn unknown_event_and_malformed_payload_are_errors() {
        assert_matches!(
            parse_event("deployment", b"{}"),
            Err(ParseError::UnknownEvent(name)) if name == "deployment"
        );
        assert_matches!(
            parse_event("pull_request", b"{not json"),
            Err(ParseError::Payload { .. })
        );
    }
}
