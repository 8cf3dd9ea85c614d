//! Aggregate review state of a changeset.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Review state of one reviewer, or of a whole changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Pending,
    Commented,
    Dismissed,
}

impl ReviewState {
    /// Parse a provider review state (`APPROVED`, `changes_requested`, ...).
    ///
    /// Unrecognised values map to [`ReviewState::Pending`].
    pub fn from_provider(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "APPROVED" => Self::Approved,
            "CHANGES_REQUESTED" | "NEEDS_WORK" => Self::ChangesRequested,
            "COMMENTED" => Self::Commented,
            "DISMISSED" => Self::Dismissed,
            _ => Self::Pending,
        }
    }

    /// Whether this state takes part in the aggregate decision.
    pub fn is_decisive(self) -> bool {
        matches!(self, Self::Approved | Self::ChangesRequested)
    }
}

/// Reduce a set of per-reviewer states to one overall state.
///
/// Most blocking wins: any `ChangesRequested` beats any `Approved`, which
/// beats the default `Pending`. The result does not depend on the order
/// of `states`.
pub fn select_review_state(states: impl IntoIterator<Item = ReviewState>) -> ReviewState {
    let mut approved = false;
    for state in states {
        match state {
            ReviewState::ChangesRequested => return ReviewState::ChangesRequested,
            ReviewState::Approved => approved = true,
            _ => {}
        }
    }
    if approved {
        ReviewState::Approved
    } else {
        ReviewState::Pending
    }
}

/// Overall state given the latest state per reviewing author.
pub fn compute_review_state(by_author: &HashMap<String, ReviewState>) -> ReviewState {
    select_review_state(by_author.values().copied())
}
