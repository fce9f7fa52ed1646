//! Entities the scorer reads and writes.
//!
//! Every row carries the id of the user that owns it; the scorer only ever
//! reads and writes rows belonging to the authenticated user.

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    delivery::{DeliveryInput, DismissalKind, Extras},
    error::{ClosedReason, ValidationError},
    overs::Overs,
};

/// Wickets that end an innings.
pub const MAX_WICKETS: u8 = 10;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

entity_id!(
    /// Authenticated user; owns every other entity.
    UserId
);
entity_id!(TeamId);
entity_id!(PlayerId);
entity_id!(MatchId);
entity_id!(InningsId);
entity_id!(DeliveryId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub owner: UserId,
    pub name: String,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerRole {
    Batter,
    Bowler,
    #[serde(rename = "All-rounder")]
    AllRounder,
    #[serde(rename = "Wicket-keeper")]
    WicketKeeper,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub owner: UserId,
    pub team: TeamId,
    pub name: String,
    pub role: Option<PlayerRole>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchFormat {
    T20,
    #[serde(rename = "One-day")]
    OneDay,
    Custom,
}

impl MatchFormat {
    /// Overs per innings implied by the format. Custom matches choose their
    /// own.
    #[must_use]
    pub const fn default_overs(self) -> Option<u32> {
        match self {
            Self::T20 => Some(20),
            Self::OneDay => Some(50),
            Self::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TossDecision {
    Bat,
    Bowl,
}

impl FromStr for TossDecision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bat" => Ok(Self::Bat),
            "bowl" => Ok(Self::Bowl),
            other => Err(ValidationError::InvalidDecision(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toss {
    pub winner: TeamId,
    pub decision: TossDecision,
}

/// Which team bats and which bowls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sides {
    pub batting: TeamId,
    pub bowling: TeamId,
}

impl Sides {
    #[must_use]
    pub const fn reversed(self) -> Self {
        Self {
            batting: self.bowling,
            bowling: self.batting,
        }
    }
}

/// Input for creating a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub team1: TeamId,
    pub team2: TeamId,
    pub format: MatchFormat,
    /// Overrides the format's default overs. Required for custom matches.
    pub overs: Option<u32>,
    pub venue: Option<String>,
    pub date: NaiveDate,
}

impl NewMatch {
    #[must_use]
    pub fn new(team1: TeamId, team2: TeamId, format: MatchFormat, date: NaiveDate) -> Self {
        Self {
            team1,
            team2,
            format,
            overs: None,
            venue: None,
            date,
        }
    }

    #[must_use]
    pub fn with_overs(mut self, overs: u32) -> Self {
        self.overs = Some(overs);
        self
    }

    #[must_use]
    pub fn at(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub owner: UserId,
    pub team1: TeamId,
    pub team2: TeamId,
    pub format: MatchFormat,
    pub overs_limit: u32,
    pub venue: Option<String>,
    pub date: NaiveDate,
    pub status: MatchStatus,
    pub current_innings: u8,
    pub toss: Option<Toss>,
    /// Set once, from the toss, and never recomputed.
    pub sides: Option<Sides>,
}

impl Match {
    #[must_use]
    pub fn involves(&self, team: TeamId) -> bool {
        self.team1 == team || self.team2 == team
    }

    /// The other team in this match, if `team` is playing.
    #[must_use]
    pub fn opponent(&self, team: TeamId) -> Option<TeamId> {
        if team == self.team1 {
            Some(self.team2)
        } else if team == self.team2 {
            Some(self.team1)
        } else {
            None
        }
    }
}

/// Players currently in the middle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crease {
    pub striker: Option<PlayerId>,
    pub non_striker: Option<PlayerId>,
    pub bowler: Option<PlayerId>,
}

impl Crease {
    #[must_use]
    pub const fn new(striker: PlayerId, non_striker: PlayerId, bowler: PlayerId) -> Self {
        Self {
            striker: Some(striker),
            non_striker: Some(non_striker),
            bowler: Some(bowler),
        }
    }

    /// Batters change ends; the bowler stays.
    #[must_use]
    pub const fn swapped(self) -> Self {
        Self {
            striker: self.non_striker,
            non_striker: self.striker,
            bowler: self.bowler,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Innings {
    pub id: InningsId,
    pub owner: UserId,
    pub match_id: MatchId,
    /// 1-based.
    pub number: u8,
    pub sides: Sides,
    pub total_runs: u32,
    pub total_wickets: u8,
    pub total_overs: Overs,
    /// Runs not credited to any batter.
    pub extras: u32,
    pub crease: Crease,
}

impl Innings {
    #[must_use]
    pub fn open(owner: UserId, match_id: MatchId, number: u8, sides: Sides) -> Self {
        Self {
            id: InningsId::new(),
            owner,
            match_id,
            number,
            sides,
            total_runs: 0,
            total_wickets: 0,
            total_overs: Overs::ZERO,
            extras: 0,
            crease: Crease::default(),
        }
    }

    /// Why no further deliveries can be bowled, if that is the case.
    #[must_use]
    pub fn closed_reason(&self, overs_limit: u32) -> Option<ClosedReason> {
        if self.total_wickets >= MAX_WICKETS {
            Some(ClosedReason::AllOut)
        } else if self.total_overs.completed() >= overs_limit {
            Some(ClosedReason::OversExhausted)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_closed(&self, overs_limit: u32) -> bool {
        self.closed_reason(overs_limit).is_some()
    }
}

/// One ball-by-ball event. Immutable once written; removed only by undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub owner: UserId,
    pub match_id: MatchId,
    pub innings: InningsId,
    /// Authoritative order within the innings, starting at 1.
    pub sequence: u64,
    /// 0-based over the delivery was bowled in. Informational.
    pub over: u32,
    /// Position within the over. Informational.
    pub ball: u8,
    pub striker: PlayerId,
    pub non_striker: PlayerId,
    pub bowler: PlayerId,
    pub runs: u8,
    pub extras: Extras,
    pub wicket: Option<DismissalKind>,
}

impl Delivery {
    #[must_use]
    pub const fn input(&self) -> DeliveryInput {
        DeliveryInput {
            runs: self.runs,
            extras: self.extras,
            wicket: self.wicket,
        }
    }

    /// Who was in the middle when this ball was bowled.
    #[must_use]
    pub const fn crease(&self) -> Crease {
        Crease::new(self.striker, self.non_striker, self.bowler)
    }
}

/// A batter's figures for one innings, keyed by `(innings, player)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattingFigure {
    pub owner: UserId,
    pub match_id: MatchId,
    pub innings: InningsId,
    pub player: PlayerId,
    pub runs: u32,
    pub balls_faced: u32,
    pub fours: u32,
    pub sixes: u32,
    pub dismissal: Option<DismissalKind>,
    /// Order of first appearance at the striker's end, starting at 1.
    pub position: u8,
}

impl BattingFigure {
    #[must_use]
    pub const fn new(innings: &Innings, player: PlayerId, position: u8) -> Self {
        Self {
            owner: innings.owner,
            match_id: innings.match_id,
            innings: innings.id,
            player,
            runs: 0,
            balls_faced: 0,
            fours: 0,
            sixes: 0,
            dismissal: None,
            position,
        }
    }

    /// Runs per hundred balls; zero before the first ball faced.
    #[must_use]
    pub fn strike_rate(&self) -> f64 {
        strike_rate(self.runs, self.balls_faced)
    }

    #[must_use]
    pub const fn is_out(&self) -> bool {
        self.dismissal.is_some()
    }
}

/// A bowler's figures for one innings, keyed by `(innings, player)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlingFigure {
    pub owner: UserId,
    pub match_id: MatchId,
    pub innings: InningsId,
    pub player: PlayerId,
    pub overs: Overs,
    pub runs_conceded: u32,
    pub wickets: u32,
    pub wides: u32,
    pub no_balls: u32,
    /// Order of first delivery in the innings, starting at 1.
    pub position: u8,
}

impl BowlingFigure {
    #[must_use]
    pub const fn new(innings: &Innings, player: PlayerId, position: u8) -> Self {
        Self {
            owner: innings.owner,
            match_id: innings.match_id,
            innings: innings.id,
            player,
            overs: Overs::ZERO,
            runs_conceded: 0,
            wickets: 0,
            wides: 0,
            no_balls: 0,
            position,
        }
    }

    /// Runs conceded per over; zero until an over has been completed.
    #[must_use]
    pub fn economy(&self) -> f64 {
        economy(self.runs_conceded, self.overs)
    }
}

pub(crate) fn strike_rate(runs: u32, balls: u32) -> f64 {
    if balls == 0 {
        0.0
    } else {
        f64::from(runs) / f64::from(balls) * 100.0
    }
}

pub(crate) fn economy(runs: u32, overs: Overs) -> f64 {
    if overs.completed() == 0 {
        0.0
    } else {
        f64::from(runs) / overs.as_fraction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn innings() -> Innings {
        Innings::open(
            UserId::new(),
            MatchId::new(),
            1,
            Sides {
                batting: TeamId::new(),
                bowling: TeamId::new(),
            },
        )
    }

    #[test]
    fn strike_rate_is_zero_before_first_ball() {
        let figure = BattingFigure::new(&innings(), PlayerId::new(), 1);
        assert!(figure.strike_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn strike_rate_is_runs_per_hundred_balls() {
        let mut figure = BattingFigure::new(&innings(), PlayerId::new(), 1);
        figure.runs = 30;
        figure.balls_faced = 20;
        assert!((figure.strike_rate() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn economy_is_zero_inside_the_first_over() {
        let mut figure = BowlingFigure::new(&innings(), PlayerId::new(), 1);
        figure.overs = Overs::new(0, 5).unwrap();
        figure.runs_conceded = 12;
        let economy = figure.economy();
        assert!(!economy.is_nan());
        assert!(economy.abs() < f64::EPSILON);
    }

    #[test]
    fn economy_uses_exact_fractional_overs() {
        let mut figure = BowlingFigure::new(&innings(), PlayerId::new(), 1);
        figure.overs = Overs::new(3, 3).unwrap();
        figure.runs_conceded = 21;
        assert!((figure.economy() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn innings_closes_on_ten_wickets_or_overs() {
        let mut innings = innings();
        assert_eq!(innings.closed_reason(20), None);

        innings.total_overs = Overs::new(20, 0).unwrap();
        assert_eq!(innings.closed_reason(20), Some(ClosedReason::OversExhausted));

        innings.total_overs = Overs::new(4, 2).unwrap();
        innings.total_wickets = MAX_WICKETS;
        assert_eq!(innings.closed_reason(20), Some(ClosedReason::AllOut));
    }

    #[test]
    fn opponent_is_the_other_team() {
        let (a, b) = (TeamId::new(), TeamId::new());
        let game = Match {
            id: MatchId::new(),
            owner: UserId::new(),
            team1: a,
            team2: b,
            format: MatchFormat::T20,
            overs_limit: 20,
            venue: None,
            date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            status: MatchStatus::NotStarted,
            current_innings: 1,
            toss: None,
            sides: None,
        };
        assert_eq!(game.opponent(a), Some(b));
        assert_eq!(game.opponent(b), Some(a));
        assert_eq!(game.opponent(TeamId::new()), None);
    }

    #[test]
    fn wire_names_match_the_data_model() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::NotStarted).unwrap(),
            "\"Not Started\""
        );
        assert_eq!(
            serde_json::to_string(&MatchFormat::OneDay).unwrap(),
            "\"One-day\""
        );
        assert_eq!(serde_json::to_string(&TossDecision::Bowl).unwrap(), "\"bowl\"");
        assert_eq!("bat".parse::<TossDecision>().unwrap(), TossDecision::Bat);
        assert!(matches!(
            "field".parse::<TossDecision>(),
            Err(ValidationError::InvalidDecision(_))
        ));
    }
}
