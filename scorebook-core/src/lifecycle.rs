//! Match and innings lifecycle.
//!
//! A match moves `Not Started → In Progress → Completed` and never back. The
//! toss starts it and fixes, once, which side bats first. Completion is
//! triggered from outside; nothing here decides that a match is over.

use crate::{
    error::{LifecycleError, ValidationError},
    model::{Innings, Match, MatchStatus, Sides, Toss, TossDecision},
};

/// Innings in a limited-overs match.
pub const INNINGS_PER_MATCH: u8 = 2;

/// An event that moves a match between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    TossResolved,
    Completed,
}

impl MatchStatus {
    /// The status after `transition`.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] for any move the state machine does not
    /// allow. Nothing leaves `Completed`.
    pub const fn transition(self, transition: Transition) -> Result<Self, LifecycleError> {
        match (self, transition) {
            (Self::Completed, _) => Err(LifecycleError::Completed),
            (Self::NotStarted, Transition::TossResolved) => Ok(Self::InProgress),
            (Self::InProgress, Transition::TossResolved) => {
                Err(LifecycleError::TossAlreadyRecorded(self))
            }
            (Self::InProgress, Transition::Completed) => Ok(Self::Completed),
            (Self::NotStarted, Transition::Completed) => Err(LifecycleError::NotInProgress(self)),
        }
    }

    /// Deliveries, undo and innings changes are only accepted in play.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Completed`] or
    /// [`LifecycleError::NotInProgress`].
    pub const fn ensure_in_progress(self) -> Result<(), LifecycleError> {
        match self {
            Self::InProgress => Ok(()),
            Self::Completed => Err(LifecycleError::Completed),
            Self::NotStarted => Err(LifecycleError::NotInProgress(self)),
        }
    }
}

impl Toss {
    /// Which side bats first: the winner if they chose to bat, otherwise the
    /// other team.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotInMatch`] if the winner is not one of
    /// the match's teams.
    pub fn assign(&self, game: &Match) -> Result<Sides, ValidationError> {
        let opponent = game
            .opponent(self.winner)
            .ok_or_else(|| ValidationError::NotInMatch(self.winner.as_uuid()))?;
        Ok(match self.decision {
            TossDecision::Bat => Sides {
                batting: self.winner,
                bowling: opponent,
            },
            TossDecision::Bowl => Sides {
                batting: opponent,
                bowling: self.winner,
            },
        })
    }
}

/// Record the toss on a match that has not started.
///
/// Returns the match now in progress together with its first innings.
///
/// # Errors
///
/// Returns an error if the match has already started or the winner is not
/// playing in it.
pub fn resolve_toss(game: &Match, toss: Toss) -> Result<(Match, Innings), TossError> {
    let status = game.status.transition(Transition::TossResolved)?;
    let sides = toss.assign(game)?;

    let mut started = game.clone();
    started.status = status;
    started.toss = Some(toss);
    started.sides = Some(sides);
    started.current_innings = 1;

    let innings = Innings::open(game.owner, game.id, 1, sides);
    Ok((started, innings))
}

/// Open the second innings with the sides reversed.
///
/// # Errors
///
/// Returns an error unless the match is in progress and still in its first
/// innings.
pub fn start_second_innings(game: &Match) -> Result<(Match, Innings), LifecycleError> {
    game.status.ensure_in_progress()?;
    if game.current_innings >= INNINGS_PER_MATCH {
        return Err(LifecycleError::SecondInningsStarted);
    }
    let sides = game
        .sides
        .ok_or(LifecycleError::NotInProgress(game.status))?
        .reversed();

    let mut next = game.clone();
    next.current_innings = INNINGS_PER_MATCH;
    let innings = Innings::open(game.owner, game.id, INNINGS_PER_MATCH, sides);
    Ok((next, innings))
}

/// Mark an in-progress match completed.
///
/// # Errors
///
/// Returns a [`LifecycleError`] unless the match is in progress.
pub fn complete(game: &Match) -> Result<Match, LifecycleError> {
    let mut done = game.clone();
    done.status = game.status.transition(Transition::Completed)?;
    Ok(done)
}

/// Toss resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TossError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
