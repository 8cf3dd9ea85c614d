//! Historical changeset counts.
//!
//! [`calc_counts`] answers "how many changesets were open, merged, approved,
//! ... at time T" for one snapshot per day, by replaying each changeset's
//! event history up to every snapshot boundary.

use std::collections::HashMap;

use chrono::Duration;
use serde::Serialize;

use crate::changeset::Changeset;
use crate::error::CoreError;
use crate::events::{ChangesetEvent, ChangesetEventKind};
use crate::review::{compute_review_state, ReviewState};
use crate::types::{DbId, Timestamp};

#[derive(Debug, thiserror::Error)]
pub enum CountsError {
    #[error("changeset {changeset_id}: {author} unapproved without a prior approval")]
    UnapprovedWithoutApproval { changeset_id: DbId, author: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Counts at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetCounts {
    pub time: Timestamp,
    pub total: i32,
    pub merged: i32,
    pub closed: i32,
    pub open: i32,
    pub open_approved: i32,
    pub open_changes_requested: i32,
    pub open_pending: i32,
}

impl ChangesetCounts {
    fn at(time: Timestamp) -> Self {
        Self {
            time,
            total: 0,
            merged: 0,
            closed: 0,
            open: 0,
            open_approved: 0,
            open_changes_requested: 0,
            open_pending: 0,
        }
    }

    fn review_bucket(&mut self, state: ReviewState) -> &mut i32 {
        match state {
            ReviewState::Approved => &mut self.open_approved,
            ReviewState::ChangesRequested => &mut self.open_changes_requested,
            _ => &mut self.open_pending,
        }
    }
}

/// Snapshot times: whole days back from `end` while not before `start`,
/// oldest first.
fn snapshot_times(start: Timestamp, end: Timestamp) -> Vec<Timestamp> {
    let mut times = Vec::new();
    let mut t = end;
    while t >= start {
        times.push(t);
        t -= Duration::days(1);
    }
    times.reverse();
    times
}

/// One count snapshot per whole day from `start` to `end`, oldest first.
///
/// `events` may hold the history of any number of changesets; each
/// changeset only replays its own events, in timestamp order. Events
/// without a known timestamp are ignored.
pub fn calc_counts(
    start: Timestamp,
    end: Timestamp,
    changesets: &[Changeset],
    events: &[ChangesetEvent],
) -> Result<Vec<ChangesetCounts>, CountsError> {
    let mut counts: Vec<ChangesetCounts> = snapshot_times(start, end)
        .into_iter()
        .map(ChangesetCounts::at)
        .collect();

    let mut by_changeset: HashMap<DbId, Vec<(Timestamp, &ChangesetEvent)>> = HashMap::new();
    for event in events {
        if let Some(ts) = event.timestamp() {
            by_changeset
                .entry(event.changeset_id)
                .or_default()
                .push((ts, event));
        }
    }
    for history in by_changeset.values_mut() {
        history.sort_by_key(|(ts, _)| *ts);
    }

    for changeset in changesets {
        let Some(created_at) = changeset.external_created_at() else {
            continue;
        };
        let history = by_changeset
            .get(&changeset.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for snapshot in counts.iter_mut() {
            if snapshot.time < created_at {
                continue;
            }
            if changeset
                .external_deleted_at
                .is_some_and(|deleted_at| snapshot.time >= deleted_at)
            {
                snapshot.total += 1;
                snapshot.closed += 1;
                continue;
            }
            replay(changeset.id, history, snapshot)?;
        }
    }

    Ok(counts)
}

/// Add one changeset's state at `snapshot.time` to the snapshot.
fn replay(
    changeset_id: DbId,
    history: &[(Timestamp, &ChangesetEvent)],
    snapshot: &mut ChangesetCounts,
) -> Result<(), CountsError> {
    use ChangesetEventKind as K;

    snapshot.total += 1;
    snapshot.open += 1;
    snapshot.open_pending += 1;

    let mut closed = false;
    let mut review = ReviewState::Pending;
    let mut by_author: HashMap<String, ReviewState> = HashMap::new();

    for (ts, event) in history {
        if *ts > snapshot.time {
            break;
        }
        match event.kind {
            K::GitHubClosed | K::BitbucketServerDeclined => {
                if closed {
                    continue;
                }
                closed = true;
                snapshot.open -= 1;
                snapshot.closed += 1;
                *snapshot.review_bucket(review) -= 1;
            }
            K::GitHubReopened | K::BitbucketServerReopened => {
                if !closed {
                    continue;
                }
                closed = false;
                snapshot.closed -= 1;
                snapshot.open += 1;
                *snapshot.review_bucket(review) += 1;
            }
            K::GitHubMerged | K::BitbucketServerMerged => {
                if closed {
                    snapshot.closed -= 1;
                } else {
                    *snapshot.review_bucket(review) -= 1;
                    snapshot.open -= 1;
                }
                snapshot.merged += 1;
                return Ok(());
            }
            K::GitHubReviewed | K::BitbucketServerApproved | K::BitbucketServerReviewed => {
                let state = event.review_state()?;
                if !state.is_decisive() {
                    continue;
                }
                by_author.insert(event.review_author()?.to_string(), state);
                review = shift_review(snapshot, review, &by_author, closed);
            }
            K::BitbucketServerUnapproved => {
                let author = event.review_author()?;
                if by_author.get(author) != Some(&ReviewState::Approved) {
                    return Err(CountsError::UnapprovedWithoutApproval {
                        changeset_id,
                        author: author.to_string(),
                    });
                }
                by_author.remove(author);
                review = shift_review(snapshot, review, &by_author, closed);
            }
            _ => {}
        }
    }
    Ok(())
}

/// Recompute the overall review state and move an open changeset between
/// buckets when it changed.
fn shift_review(
    snapshot: &mut ChangesetCounts,
    current: ReviewState,
    by_author: &HashMap<String, ReviewState>,
    closed: bool,
) -> ReviewState {
    let next = compute_review_state(by_author);
    if next != current && !closed {
        *snapshot.review_bucket(current) -= 1;
        *snapshot.review_bucket(next) += 1;
    }
    next
}
