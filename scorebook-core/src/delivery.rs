//! Delivery classification.
//!
//! A scorer enters three things per ball: runs, the kind of extra (if any) and
//! whether a wicket fell. [`classify`] turns that raw input, together with the
//! over clock, into everything the aggregates need: legality, how the runs
//! split between batter and extras, boundary credit and strike rotation.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, overs::Overs};

/// Most runs that can be entered for a single delivery.
pub const MAX_RUNS_PER_DELIVERY: u8 = 7;

/// Kind of extra attached to a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Extras {
    #[default]
    #[serde(rename = "none")]
    None,
    Wide,
    #[serde(rename = "No Ball")]
    NoBall,
    Bye,
    #[serde(rename = "Leg Bye")]
    LegBye,
}

impl Extras {
    /// Wides and no-balls do not count toward the six-ball over.
    #[must_use]
    pub const fn is_legal(self) -> bool {
        !matches!(self, Self::Wide | Self::NoBall)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Wide => "Wide",
            Self::NoBall => "No Ball",
            Self::Bye => "Bye",
            Self::LegBye => "Leg Bye",
        }
    }
}

impl fmt::Display for Extras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Extras {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::None),
            "Wide" => Ok(Self::Wide),
            "No Ball" => Ok(Self::NoBall),
            "Bye" => Ok(Self::Bye),
            "Leg Bye" => Ok(Self::LegBye),
            other => Err(ValidationError::UnknownExtras(other.to_string())),
        }
    }
}

/// How the striker was dismissed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DismissalKind {
    /// Dismissal recorded without further detail.
    #[default]
    Out,
    Bowled,
    Caught,
    #[serde(rename = "LBW")]
    Lbw,
    #[serde(rename = "Run Out")]
    RunOut,
    Stumped,
    #[serde(rename = "Hit Wicket")]
    HitWicket,
}

impl DismissalKind {
    /// Run outs count against the batting side but not for the bowler.
    #[must_use]
    pub const fn credited_to_bowler(self) -> bool {
        !matches!(self, Self::RunOut)
    }
}

/// Raw scoring input for one delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInput {
    pub runs: u8,
    pub extras: Extras,
    pub wicket: Option<DismissalKind>,
}

impl DeliveryInput {
    /// Runs off the bat.
    #[must_use]
    pub const fn runs(runs: u8) -> Self {
        Self {
            runs,
            extras: Extras::None,
            wicket: None,
        }
    }

    /// A wide plus `runs` further runs taken.
    #[must_use]
    pub const fn wide(runs: u8) -> Self {
        Self::extra(Extras::Wide, runs)
    }

    /// A no-ball plus `runs` further runs taken.
    #[must_use]
    pub const fn no_ball(runs: u8) -> Self {
        Self::extra(Extras::NoBall, runs)
    }

    #[must_use]
    pub const fn byes(runs: u8) -> Self {
        Self::extra(Extras::Bye, runs)
    }

    #[must_use]
    pub const fn leg_byes(runs: u8) -> Self {
        Self::extra(Extras::LegBye, runs)
    }

    #[must_use]
    pub const fn extra(extras: Extras, runs: u8) -> Self {
        Self {
            runs,
            extras,
            wicket: None,
        }
    }

    /// A dot ball on which the striker is out.
    #[must_use]
    pub const fn wicket() -> Self {
        Self::runs(0).with_wicket(DismissalKind::Out)
    }

    #[must_use]
    pub const fn with_wicket(mut self, kind: DismissalKind) -> Self {
        self.wicket = Some(kind);
        self
    }

    #[must_use]
    pub const fn is_wicket(&self) -> bool {
        self.wicket.is_some()
    }

    /// Reject input no delivery can produce.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::RunsOutOfRange`] when more than
    /// [`MAX_RUNS_PER_DELIVERY`] runs are entered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.runs > MAX_RUNS_PER_DELIVERY {
            return Err(ValidationError::RunsOutOfRange(self.runs));
        }
        Ok(())
    }
}

/// A delivery with its scoring consequences worked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub input: DeliveryInput,
    /// Counts toward the six-ball over.
    pub legal: bool,
    /// Added to the team total.
    pub total_runs_added: u32,
    /// Credited to the striker's personal tally.
    pub batter_runs: u32,
    /// Added to the team total but not to any batter.
    pub extras_runs: u32,
    pub four: bool,
    pub six: bool,
    /// Wicket credited to the bowler.
    pub bowler_wicket: bool,
    /// This is the sixth legal ball of the over.
    pub completes_over: bool,
    /// Striker and non-striker swap ends for the next delivery.
    pub strike_rotates: bool,
}

impl Classified {
    #[must_use]
    pub const fn is_wicket(&self) -> bool {
        self.input.is_wicket()
    }

    #[must_use]
    pub const fn is_wide(&self) -> bool {
        matches!(self.input.extras, Extras::Wide)
    }

    #[must_use]
    pub const fn is_no_ball(&self) -> bool {
        matches!(self.input.extras, Extras::NoBall)
    }
}

/// Classify a delivery bowled when the over clock reads `clock`.
///
/// Wides and no-balls carry a one-run penalty on top of whatever was run, and
/// all of it goes to extras. Byes and leg byes go to extras without a penalty.
/// Only plain runs off the bat reach the batter, and only those earn boundary
/// credit. Strike changes on an odd number of runs or at the end of the over.
#[must_use]
pub fn classify(input: &DeliveryInput, clock: Overs) -> Classified {
    let legal = input.extras.is_legal();
    let runs = u32::from(input.runs);
    let total_runs_added = if legal { runs } else { runs + 1 };
    let off_the_bat = matches!(input.extras, Extras::None);
    let batter_runs = if off_the_bat { runs } else { 0 };
    let completes_over = clock.completes_over(legal);

    Classified {
        input: *input,
        legal,
        total_runs_added,
        batter_runs,
        extras_runs: total_runs_added - batter_runs,
        four: off_the_bat && input.runs == 4,
        six: off_the_bat && input.runs == 6,
        bowler_wicket: input.wicket.is_some_and(DismissalKind::credited_to_bowler),
        completes_over,
        strike_rotates: input.runs % 2 == 1 || completes_over,
    }
}
