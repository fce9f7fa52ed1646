//! Aggregation engine.
//!
//! Three running aggregates follow every delivery: the innings totals, the
//! striker's batting figure and the bowler's bowling figure. Each implements
//! [`Apply`] for a [`Scored`] delivery, which is all the scorer needs to move
//! them forward one ball at a time.
//!
//! [`Scorecard::replay`] rebuilds all three from the delivery log alone. Undo
//! uses it to recompute the aggregates from what is left after the last
//! delivery is removed, so the totals can never drift from the log.

use crate::{
    delivery::{Classified, DeliveryInput, classify},
    model::{BattingFigure, BowlingFigure, Crease, Delivery, DeliveryId, Innings, PlayerId},
    overs::Overs,
};

/// Mutate an aggregate with one scoring event.
pub trait Apply<E> {
    fn apply(&mut self, event: &E);
}

/// A delivery together with its classification against the innings clock.
#[derive(Debug, Clone, Copy)]
pub struct Scored<'a> {
    pub delivery: &'a Delivery,
    pub classified: Classified,
}

impl<'a> Scored<'a> {
    /// Classify `delivery` as bowled when the innings clock read `clock`.
    #[must_use]
    pub fn new(delivery: &'a Delivery, clock: Overs) -> Self {
        Self {
            delivery,
            classified: classify(&delivery.input(), clock),
        }
    }
}

/// The players involved in a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ends {
    pub striker: PlayerId,
    pub non_striker: PlayerId,
    pub bowler: PlayerId,
}

/// Build the next delivery of `innings`.
///
/// The sequence number follows `last_sequence`; the over and ball labels are
/// read off the innings clock.
#[must_use]
pub fn next_delivery(
    innings: &Innings,
    last_sequence: Option<u64>,
    ends: Ends,
    input: DeliveryInput,
) -> Delivery {
    let clock = innings.total_overs;
    Delivery {
        id: DeliveryId::new(),
        owner: innings.owner,
        match_id: innings.match_id,
        innings: innings.id,
        sequence: last_sequence.map_or(1, |last| last + 1),
        over: clock.completed(),
        ball: clock.legal_balls_in_current_over() + 1,
        striker: ends.striker,
        non_striker: ends.non_striker,
        bowler: ends.bowler,
        runs: input.runs,
        extras: input.extras,
        wicket: input.wicket,
    }
}

/// Who is in the middle after `scored`.
///
/// Batters change ends when the classification says so. A dismissed striker
/// leaves their end empty for the incoming batter.
#[must_use]
pub fn crease_after(scored: &Scored<'_>) -> Crease {
    let delivery = scored.delivery;
    let mut crease = delivery.crease();
    if scored.classified.is_wicket() {
        crease.striker = None;
    }
    if scored.classified.strike_rotates {
        crease = crease.swapped();
    }
    crease
}

impl Apply<Scored<'_>> for Innings {
    fn apply(&mut self, event: &Scored<'_>) {
        let classified = &event.classified;
        self.total_runs += classified.total_runs_added;
        self.extras += classified.extras_runs;
        if classified.is_wicket() {
            self.total_wickets = self.total_wickets.saturating_add(1);
        }
        self.total_overs = self.total_overs.advance(classified.legal);
        self.crease = crease_after(event);
    }
}

impl Apply<Scored<'_>> for BattingFigure {
    fn apply(&mut self, event: &Scored<'_>) {
        let classified = &event.classified;
        self.runs += classified.batter_runs;
        if classified.legal {
            self.balls_faced += 1;
        }
        if classified.four {
            self.fours += 1;
        }
        if classified.six {
            self.sixes += 1;
        }
        if let Some(kind) = classified.input.wicket {
            self.dismissal = Some(kind);
        }
    }
}

impl Apply<Scored<'_>> for BowlingFigure {
    fn apply(&mut self, event: &Scored<'_>) {
        let classified = &event.classified;
        self.overs = self.overs.advance(classified.legal);
        self.runs_conceded += classified.total_runs_added;
        if classified.bowler_wicket {
            self.wickets += 1;
        }
        if classified.is_wide() {
            self.wides += 1;
        }
        if classified.is_no_ball() {
            self.no_balls += 1;
        }
    }
}

/// Innings totals and every figure, derived from the delivery log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    pub innings: Innings,
    /// In batting order.
    pub batting: Vec<BattingFigure>,
    /// In order of first delivery.
    pub bowling: Vec<BowlingFigure>,
    pub last_sequence: Option<u64>,
}

impl Scorecard {
    /// An empty scorecard for `innings`: identity and sides kept, every total
    /// back to zero.
    #[must_use]
    pub fn new(innings: &Innings) -> Self {
        let mut blank =
            Innings::open(innings.owner, innings.match_id, innings.number, innings.sides);
        blank.id = innings.id;
        Self {
            innings: blank,
            batting: Vec::new(),
            bowling: Vec::new(),
            last_sequence: None,
        }
    }

    /// Recompute everything from `deliveries`, applied in sequence order.
    #[must_use]
    pub fn replay<'a>(
        innings: &Innings,
        deliveries: impl IntoIterator<Item = &'a Delivery>,
    ) -> Self {
        let mut log: Vec<&Delivery> = deliveries.into_iter().collect();
        log.sort_by_key(|delivery| delivery.sequence);

        let mut card = Self::new(innings);
        for delivery in log {
            card.record(delivery);
        }
        tracing::trace!(
            innings = %innings.id,
            deliveries = ?card.last_sequence,
            runs = card.innings.total_runs,
            "scorecard replayed"
        );
        card
    }

    /// Apply one more delivery.
    pub fn record(&mut self, delivery: &Delivery) -> Classified {
        let scored = Scored::new(delivery, self.innings.total_overs);

        let batting = match self
            .batting
            .iter()
            .position(|figure| figure.player == delivery.striker)
        {
            Some(index) => index,
            None => {
                let position = next_position(self.batting.len());
                self.batting
                    .push(BattingFigure::new(&self.innings, delivery.striker, position));
                self.batting.len() - 1
            }
        };
        self.batting[batting].apply(&scored);

        let bowling = match self
            .bowling
            .iter()
            .position(|figure| figure.player == delivery.bowler)
        {
            Some(index) => index,
            None => {
                let position = next_position(self.bowling.len());
                self.bowling
                    .push(BowlingFigure::new(&self.innings, delivery.bowler, position));
                self.bowling.len() - 1
            }
        };
        self.bowling[bowling].apply(&scored);

        self.innings.apply(&scored);
        self.last_sequence = Some(delivery.sequence);
        scored.classified
    }

    #[must_use]
    pub fn batting_figure(&self, player: PlayerId) -> Option<&BattingFigure> {
        self.batting.iter().find(|figure| figure.player == player)
    }

    #[must_use]
    pub fn bowling_figure(&self, player: PlayerId) -> Option<&BowlingFigure> {
        self.bowling.iter().find(|figure| figure.player == player)
    }
}

/// 1-based position for the figure after `existing` others.
#[must_use]
pub fn next_position(existing: usize) -> u8 {
    u8::try_from(existing + 1).unwrap_or(u8::MAX)
}
