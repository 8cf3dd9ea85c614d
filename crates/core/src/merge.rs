//! Field-level patch-merge primitives.
//!
//! Webhook payloads and API-derived payloads each carry a different subset
//! of the truth about one occurrence, so a later observation never replaces
//! a stored one wholesale. Every event metadata shape implements
//! [`MergeFrom`] by combining the helpers below field by field:
//!
//! - text and identifiers: a non-blank incoming value wins, a blank one
//!   never erases what is stored
//! - creation times: the earliest known value wins
//! - update times: the latest known value wins
//! - "was edited" flags: once set they stay set

use crate::types::Timestamp;

/// Patch `self` with whatever `other` knows that `self` does not.
pub trait MergeFrom {
    fn merge_from(&mut self, other: &Self);
}

/// Take `incoming` unless it is blank.
pub fn merge_text(current: &mut String, incoming: &str) {
    if !incoming.is_empty() && current != incoming {
        *current = incoming.to_string();
    }
}

/// Take `incoming` unless it is zero.
pub fn merge_id(current: &mut i64, incoming: i64) {
    if incoming != 0 {
        *current = incoming;
    }
}

/// Keep the earliest known creation time.
pub fn merge_created_at(current: &mut Option<Timestamp>, incoming: Option<Timestamp>) {
    match (*current, incoming) {
        (None, Some(_)) => *current = incoming,
        (Some(existing), Some(other)) if other < existing => *current = incoming,
        _ => {}
    }
}

/// Keep the latest known update time.
pub fn merge_updated_at(current: &mut Option<Timestamp>, incoming: Option<Timestamp>) {
    match (*current, incoming) {
        (None, Some(_)) => *current = incoming,
        (Some(existing), Some(other)) if other > existing => *current = incoming,
        _ => {}
    }
}

/// Monotonic flag: never goes back to `false`.
pub fn merge_flag(current: &mut bool, incoming: bool) {
    *current = *current || incoming;
}

/// Merge an optional nested value, creating it when only `incoming` has one.
pub fn merge_option<T: MergeFrom + Clone>(current: &mut Option<T>, incoming: &Option<T>) {
    match (current.as_mut(), incoming) {
        (Some(existing), Some(other)) => existing.merge_from(other),
        (None, Some(other)) => *current = Some(other.clone()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn ts(secs: i64) -> Option<Timestamp> {
        Some(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn blank_text_never_erases() {
        let mut body = "hello".to_string();
        merge_text(&mut body, "");
        assert_eq!(body, "hello");
    }

    #[test]
    fn blank_text_is_filled() {
        let mut body = String::new();
        merge_text(&mut body, "filled");
        assert_eq!(body, "filled");
    }

    #[test]
    fn differing_text_is_overwritten() {
        let mut body = "old".to_string();
        merge_text(&mut body, "new");
        assert_eq!(body, "new");
    }

    #[test]
    fn zero_id_never_erases() {
        let mut id = 42;
        merge_id(&mut id, 0);
        assert_eq!(id, 42);
    }

    #[test]
    fn earliest_created_at_wins() {
        let mut created = ts(200);
        merge_created_at(&mut created, ts(100));
        assert_eq!(created, ts(100));
        merge_created_at(&mut created, ts(300));
        assert_eq!(created, ts(100));
        merge_created_at(&mut created, None);
        assert_eq!(created, ts(100));
    }

    #[test]
    fn latest_updated_at_wins() {
        let mut updated = ts(200);
        merge_updated_at(&mut updated, ts(100));
        assert_eq!(updated, ts(200));
        merge_updated_at(&mut updated, ts(300));
        assert_eq!(updated, ts(300));
        merge_updated_at(&mut updated, None);
        assert_eq!(updated, ts(300));
    }

    #[test]
    fn flags_are_monotonic() {
        let mut edited = true;
        merge_flag(&mut edited, false);
        assert!(edited);

        let mut fresh = false;
        merge_flag(&mut fresh, true);
        assert!(fresh);
    }
}
