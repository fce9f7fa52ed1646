//! Error types surfaced by the scoring service.
//!
//! Every operation either commits completely or fails with one of these; no
//! error leaves half-applied aggregates behind.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    concurrency::ConcurrencyConflict, lifecycle::TossError, model::MatchStatus,
    store::CommitError,
};

/// Input rejected before any store call was made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select a striker before recording a delivery")]
    MissingStriker,
    #[error("select a non-striker before recording a delivery")]
    MissingNonStriker,
    #[error("select a bowler before recording a delivery")]
    MissingBowler,
    #[error("striker and non-striker must be different players")]
    SameBatter,
    #[error("player {0} is not in the batting side")]
    NotInBattingSide(Uuid),
    #[error("player {0} is not in the bowling side")]
    NotInBowlingSide(Uuid),
    #[error("{0} runs cannot be scored from one delivery")]
    RunsOutOfRange(u8),
    #[error("unknown extras kind `{0}`")]
    UnknownExtras(String),
    #[error("invalid toss decision `{0}`, expected `bat` or `bowl`")]
    InvalidDecision(String),
    #[error("overs per innings must be greater than zero")]
    NonPositiveOvers,
    #[error("a match needs two different teams")]
    SameTeam,
    #[error("team {0} is not playing in this match")]
    NotInMatch(Uuid),
    #[error("{0} must not be empty")]
    EmptyName(&'static str),
    #[error("innings is closed: {0}")]
    InningsClosed(ClosedReason),
}

/// Why an innings accepts no further deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClosedReason {
    #[error("all out")]
    AllOut,
    #[error("overs exhausted")]
    OversExhausted,
}

/// A match status change that the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("toss already recorded (match is {0})")]
    TossAlreadyRecorded(MatchStatus),
    #[error("match is {0}, expected In Progress")]
    NotInProgress(MatchStatus),
    #[error("match is completed; no further changes are accepted")]
    Completed,
    #[error("innings {0} is not the current innings")]
    NotCurrentInnings(u8),
    #[error("second innings already started")]
    SecondInningsStarted,
}

/// Error type for every [`Scorer`](crate::scorer::Scorer) operation.
#[derive(Debug, Error)]
pub enum ScoringError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error("no authenticated user")]
    Unauthenticated,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Conflict(ConcurrencyConflict<u64>),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("store did not respond within {0:?}")]
    TimedOut(Duration),
}

impl<StoreError> ScoringError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// Whether repeating the operation from a fresh read may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::StoreUnavailable(_) | Self::TimedOut(_)
        )
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<Uuid>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl<StoreError> From<CommitError<StoreError>> for ScoringError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    fn from(error: CommitError<StoreError>) -> Self {
        match error {
            CommitError::Conflict(conflict) => Self::Conflict(conflict),
            CommitError::Store(error) => Self::StoreUnavailable(error),
        }
    }
}

impl<StoreError> From<TossError> for ScoringError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    fn from(error: TossError) -> Self {
        match error {
            TossError::Lifecycle(error) => Self::Lifecycle(error),
            TossError::Validation(error) => Self::Validation(error),
        }
    }
}
