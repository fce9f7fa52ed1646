//! Read models.
//!
//! A [`Scoreboard`] is the live view of one match; [`Statistics`] are career
//! figures across every innings the user has scored. Both are rebuilt from
//! stored figure rows and never written back.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    model::{
        BattingFigure, BowlingFigure, Crease, Innings, Match, Player, PlayerId, economy,
        strike_rate,
    },
    overs::Overs,
};

fn names(players: &[Player]) -> HashMap<PlayerId, &str> {
    players
        .iter()
        .map(|player| (player.id, player.name.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattingLine {
    pub name: Option<String>,
    pub figure: BattingFigure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BowlingLine {
    pub name: Option<String>,
    pub figure: BowlingFigure,
}

/// One innings as shown on the scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InningsCard {
    pub innings: Innings,
    /// In batting order.
    pub batting: Vec<BattingLine>,
    /// In order of first delivery.
    pub bowling: Vec<BowlingLine>,
}

impl InningsCard {
    #[must_use]
    pub const fn crease(&self) -> Crease {
        self.innings.crease
    }

    /// Runs per over so far.
    #[must_use]
    pub fn run_rate(&self) -> f64 {
        let overs = self.innings.total_overs.as_fraction();
        if overs == 0.0 {
            0.0
        } else {
            f64::from(self.innings.total_runs) / overs
        }
    }
}

/// Live view of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    #[serde(rename = "match")]
    pub game: Match,
    /// In innings-number order.
    pub innings: Vec<InningsCard>,
}

impl Scoreboard {
    /// Assemble a scoreboard from the match's stored rows.
    #[must_use]
    pub fn build(
        game: Match,
        mut innings: Vec<Innings>,
        batting: Vec<BattingFigure>,
        bowling: Vec<BowlingFigure>,
        players: &[Player],
    ) -> Self {
        let names = names(players);
        let name_of = |player: PlayerId| names.get(&player).map(|name| (*name).to_string());

        innings.sort_by_key(|innings| innings.number);
        let cards = innings
            .into_iter()
            .map(|innings| {
                let mut batting: Vec<BattingLine> = batting
                    .iter()
                    .filter(|figure| figure.innings == innings.id)
                    .map(|figure| BattingLine {
                        name: name_of(figure.player),
                        figure: figure.clone(),
                    })
                    .collect();
                batting.sort_by_key(|line| line.figure.position);

                let mut bowling: Vec<BowlingLine> = bowling
                    .iter()
                    .filter(|figure| figure.innings == innings.id)
                    .map(|figure| BowlingLine {
                        name: name_of(figure.player),
                        figure: figure.clone(),
                    })
                    .collect();
                bowling.sort_by_key(|line| line.figure.position);

                InningsCard {
                    innings,
                    batting,
                    bowling,
                }
            })
            .collect();

        Self {
            game,
            innings: cards,
        }
    }

    /// The innings currently being played, if the toss has been made.
    #[must_use]
    pub fn current(&self) -> Option<&InningsCard> {
        self.innings
            .iter()
            .find(|card| card.innings.number == self.game.current_innings)
    }

    /// Runs the side batting second needs to win.
    #[must_use]
    pub fn target(&self) -> Option<u32> {
        if self.innings.len() < 2 {
            return None;
        }
        self.innings
            .first()
            .map(|first| first.innings.total_runs + 1)
    }

    /// Runs still needed in the chase.
    #[must_use]
    pub fn runs_required(&self) -> Option<u32> {
        let target = self.target()?;
        let chasing = self.innings.get(1)?;
        Some(target.saturating_sub(chasing.innings.total_runs))
    }
}

/// Career batting across innings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattingRecord {
    pub player: PlayerId,
    pub name: Option<String>,
    pub innings: u32,
    pub runs: u32,
    pub balls: u32,
    pub fours: u32,
    pub sixes: u32,
    pub highest: u32,
}

impl BattingRecord {
    /// Runs per innings batted.
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.innings == 0 {
            0.0
        } else {
            f64::from(self.runs) / f64::from(self.innings)
        }
    }

    #[must_use]
    pub fn strike_rate(&self) -> f64 {
        strike_rate(self.runs, self.balls)
    }
}

/// Career bowling across innings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BowlingRecord {
    pub player: PlayerId,
    pub name: Option<String>,
    pub innings: u32,
    pub wickets: u32,
    pub runs: u32,
    pub overs: Overs,
    /// Most wickets in one innings.
    pub best: u32,
}

impl BowlingRecord {
    /// Runs per wicket; zero before the first wicket.
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.wickets == 0 {
            0.0
        } else {
            f64::from(self.runs) / f64::from(self.wickets)
        }
    }

    #[must_use]
    pub fn economy(&self) -> f64 {
        economy(self.runs, self.overs)
    }
}

/// Leading batters and bowlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Most runs first.
    pub batting: Vec<BattingRecord>,
    /// Most wickets first, cheapest first among equals.
    pub bowling: Vec<BowlingRecord>,
}

impl Statistics {
    /// Aggregate per-innings figures into career records, keeping the top
    /// `limit` of each.
    #[must_use]
    pub fn build(
        batting: &[BattingFigure],
        bowling: &[BowlingFigure],
        players: &[Player],
        limit: usize,
    ) -> Self {
        let names = names(players);
        let name_of = |player: PlayerId| names.get(&player).map(|name| (*name).to_string());

        let mut batters: HashMap<PlayerId, BattingRecord> = HashMap::new();
        for figure in batting {
            let record = batters
                .entry(figure.player)
                .or_insert_with(|| BattingRecord {
                    player: figure.player,
                    name: name_of(figure.player),
                    innings: 0,
                    runs: 0,
                    balls: 0,
                    fours: 0,
                    sixes: 0,
                    highest: 0,
                });
            record.innings += 1;
            record.runs += figure.runs;
            record.balls += figure.balls_faced;
            record.fours += figure.fours;
            record.sixes += figure.sixes;
            record.highest = record.highest.max(figure.runs);
        }

        let mut bowlers: HashMap<PlayerId, BowlingRecord> = HashMap::new();
        for figure in bowling {
            let record = bowlers
                .entry(figure.player)
                .or_insert_with(|| BowlingRecord {
                    player: figure.player,
                    name: name_of(figure.player),
                    innings: 0,
                    wickets: 0,
                    runs: 0,
                    overs: Overs::ZERO,
                    best: 0,
                });
            record.innings += 1;
            record.wickets += figure.wickets;
            record.runs += figure.runs_conceded;
            record.overs = record.overs + figure.overs;
            record.best = record.best.max(figure.wickets);
        }

        let mut batting: Vec<BattingRecord> = batters.into_values().collect();
        batting.sort_by(|a, b| b.runs.cmp(&a.runs).then(a.player.cmp(&b.player)));
        batting.truncate(limit);

        let mut bowling: Vec<BowlingRecord> = bowlers.into_values().collect();
        bowling.sort_by(|a, b| {
            b.wickets
                .cmp(&a.wickets)
                .then(a.runs.cmp(&b.runs))
                .then(a.player.cmp(&b.player))
        });
        bowling.truncate(limit);

        Self { batting, bowling }
    }
}
