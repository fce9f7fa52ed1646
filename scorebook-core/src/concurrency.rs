//! Optimistic concurrency.
//!
//! Every write the scorer commits carries the state it was computed from: the
//! last delivery sequence number it saw for the innings and the version of
//! each row it read. The store compares those against what it holds at commit
//! time and refuses the whole batch if any of them moved. Two devices scoring
//! the same match therefore never lose each other's deliveries; the slower one
//! gets a [`ConcurrencyConflict`] and must reload.

use std::fmt;

use thiserror::Error;

/// Error indicating the store changed between read and commit.
///
/// Positions are delivery sequence numbers or row versions depending on which
/// check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", format_conflict(.expected.as_ref(), .actual.as_ref()))]
pub struct ConcurrencyConflict<Pos: fmt::Debug> {
    /// What the writer saw when it read. `None` means it expected nothing to
    /// exist yet.
    pub expected: Option<Pos>,
    /// What the store holds now. `None` means nothing exists.
    pub actual: Option<Pos>,
}

/// Build a human-readable message for a [`ConcurrencyConflict`], including an
/// actionable hint for the caller.
fn format_conflict<Pos: fmt::Debug>(expected: Option<&Pos>, actual: Option<&Pos>) -> String {
    match (expected, actual) {
        (None, Some(actual)) => {
            format!(
                "concurrency conflict: expected nothing, found {actual:?} (hint: another \
                 device scored this innings; reload and retry)"
            )
        }
        (Some(expected), actual) => {
            format!(
                "concurrency conflict: expected {expected:?}, found {actual:?} (hint: the \
                 innings was modified; reload and retry)"
            )
        }
        (None, None) => "concurrency conflict: unexpected empty state".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_expected_nothing_mentions_hint() {
        let conflict: ConcurrencyConflict<u64> = ConcurrencyConflict {
            expected: None,
            actual: Some(42),
        };
        let msg = conflict.to_string();
        assert!(msg.contains("expected nothing"));
        assert!(msg.contains("reload and retry"));
    }

    #[test]
    fn conflict_expected_sequence_includes_both_values() {
        let conflict: ConcurrencyConflict<u64> = ConcurrencyConflict {
            expected: Some(5),
            actual: Some(10),
        };
        let msg = conflict.to_string();
        assert!(msg.contains("expected 5"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn conflict_unexpected_empty_state_formats() {
        let conflict: ConcurrencyConflict<u64> = ConcurrencyConflict {
            expected: None,
            actual: None,
        };
        assert!(conflict.to_string().contains("unexpected empty state"));
    }
}
