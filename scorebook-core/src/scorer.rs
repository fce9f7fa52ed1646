//! Application service.
//!
//! `Scorer` is the one entry point the embedding application calls. It
//! resolves the current user, validates input before touching the store,
//! serializes writes per innings, and commits each delivery (or its undo) as a
//! single guarded batch so the log and the aggregates never disagree.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{
    aggregate::{Apply, Ends, Scorecard, Scored, next_delivery, next_position},
    config::ScorerConfig,
    delivery::{Classified, DeliveryInput},
    entity::{Column, Entity, RowKey, Table},
    error::{LifecycleError, ScoringError, ValidationError},
    identity::Identity,
    lifecycle,
    model::{
        BattingFigure, BowlingFigure, Crease, Delivery, Innings, InningsId, Match, MatchId,
        MatchStatus, NewMatch, Player, PlayerId, PlayerRole, Team, TeamId, Toss, TossDecision,
        UserId,
    },
    projection::{Scoreboard, Statistics},
    store::{EntityStore, Filter, Query, SequenceGuard, SubscribableStore, Versioned},
    subscription::MatchFeed,
};

/// Result alias for scorer operations over store `S`.
pub type ScoringResult<T, S> = Result<T, ScoringError<<S as EntityStore>::Error>>;

/// Outcome of recording one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDelivery {
    pub delivery: Delivery,
    pub classified: Classified,
    /// Innings totals after the delivery.
    pub innings: Innings,
    pub batting: BattingFigure,
    pub bowling: BowlingFigure,
}

impl RecordedDelivery {
    /// Who faces the next ball.
    #[must_use]
    pub const fn crease(&self) -> Crease {
        self.innings.crease
    }
}

/// Outcome of undoing the last delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retracted {
    pub delivery: Delivery,
    /// Innings totals recomputed from the remaining log.
    pub innings: Innings,
}

type LockTable = HashMap<InningsId, Arc<tokio::sync::Mutex<()>>>;

/// Exclusive hold on one innings. The table entry goes away with the last
/// holder or waiter.
struct InningsLock {
    guard: Option<OwnedMutexGuard<()>>,
    innings: InningsId,
    locks: Arc<Mutex<LockTable>>,
}

impl Drop for InningsLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        release(&self.locks, self.innings);
    }
}

/// Forget the lock for `innings` unless someone else still holds a handle.
fn release(locks: &Mutex<LockTable>, innings: InningsId) {
    let mut locks = locks.lock().expect("innings lock table poisoned");
    if locks
        .get(&innings)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(&innings);
    }
}

/// Scorekeeping service over an entity store and an identity provider.
pub struct Scorer<S, I> {
    store: S,
    identity: I,
    config: ScorerConfig,
    locks: Arc<Mutex<LockTable>>,
}

impl<S: Clone, I: Clone> Clone for Scorer<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            identity: self.identity.clone(),
            config: self.config,
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<S, I> Scorer<S, I>
where
    S: EntityStore,
    I: Identity,
{
    #[must_use]
    pub fn new(store: S, identity: I) -> Self {
        Self {
            store,
            identity,
            config: ScorerConfig::default(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ScorerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &ScorerConfig {
        &self.config
    }

    fn user(&self) -> ScoringResult<UserId, S> {
        self.identity
            .current_user()
            .ok_or(ScoringError::Unauthenticated)
    }

    async fn within<T, E>(
        &self,
        operation: impl Future<Output = Result<T, E>>,
        map_err: impl FnOnce(E) -> ScoringError<S::Error>,
    ) -> ScoringResult<T, S> {
        let limit = self.config.store_timeout;
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result.map_err(map_err),
            Err(_) => {
                tracing::warn!(?limit, "store call timed out");
                Err(ScoringError::TimedOut(limit))
            }
        }
    }

    async fn read<T>(
        &self,
        operation: impl Future<Output = Result<T, S::Error>>,
    ) -> ScoringResult<T, S> {
        self.within(operation, ScoringError::StoreUnavailable).await
    }

    async fn fetch<T: Entity>(
        &self,
        owner: UserId,
        id: impl Into<Uuid>,
    ) -> ScoringResult<Versioned<T>, S> {
        let id = id.into();
        let row = self.read(self.store.get(T::TABLE, RowKey::Id(id))).await?;
        row.and_then(|row| {
            let version = row.version;
            T::from_record(row.value).map(|value| Versioned { value, version })
        })
        .filter(|row| row.value.owner() == owner)
        .ok_or_else(|| ScoringError::not_found(T::NAME, id))
    }

    async fn figure<T: Entity>(
        &self,
        innings: InningsId,
        player: PlayerId,
    ) -> ScoringResult<Option<Versioned<T>>, S> {
        let row = self
            .read(self.store.get(T::TABLE, RowKey::Figure { innings, player }))
            .await?;
        Ok(row.and_then(|row| {
            let version = row.version;
            T::from_record(row.value).map(|value| Versioned { value, version })
        }))
    }

    async fn list<T: Entity>(&self, query: Query) -> ScoringResult<Vec<Versioned<T>>, S> {
        let rows = self.read(self.store.query(&query)).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let version = row.version;
                T::from_record(row.value).map(|value| Versioned { value, version })
            })
            .collect())
    }

    async fn values<T: Entity>(&self, query: Query) -> ScoringResult<Vec<T>, S> {
        Ok(self
            .list::<T>(query)
            .await?
            .into_iter()
            .map(|row| row.value)
            .collect())
    }

    async fn last_delivery(&self, innings: InningsId) -> ScoringResult<Option<Delivery>, S> {
        let query = Query::new(Filter::table(Table::Deliveries).eq(Column::Innings, innings))
            .descending(Column::Sequence)
            .limit(1);
        Ok(self.values::<Delivery>(query).await?.into_iter().next())
    }

    /// Wait for exclusive use of an innings.
    async fn lock_innings(&self, innings: InningsId) -> ScoringResult<InningsLock, S> {
        let lock = {
            let mut locks = self.locks.lock().expect("innings lock table poisoned");
            Arc::clone(locks.entry(innings).or_default())
        };
        let limit = self.config.lock_timeout;
        let acquired = tokio::time::timeout(limit, lock.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(InningsLock {
                guard: Some(guard),
                innings,
                locks: Arc::clone(&self.locks),
            }),
            Err(_) => {
                release(&self.locks, innings);
                tracing::warn!(%innings, ?limit, "timed out waiting for innings lock");
                Err(ScoringError::TimedOut(limit))
            }
        }
    }

    async fn ensure_on_side(
        &self,
        owner: UserId,
        player: PlayerId,
        team: TeamId,
        wrong_side: fn(Uuid) -> ValidationError,
    ) -> ScoringResult<(), S> {
        let player = self.fetch::<Player>(owner, player).await?.value;
        if player.team == team {
            Ok(())
        } else {
            Err(wrong_side(player.id.as_uuid()).into())
        }
    }

    async fn ensure_crease(
        &self,
        owner: UserId,
        innings: &Innings,
        crease: Crease,
    ) -> ScoringResult<(), S> {
        if crease.striker.is_some() && crease.striker == crease.non_striker {
            return Err(ValidationError::SameBatter.into());
        }
        for batter in [crease.striker, crease.non_striker].into_iter().flatten() {
            self.ensure_on_side(
                owner,
                batter,
                innings.sides.batting,
                ValidationError::NotInBattingSide,
            )
            .await?;
        }
        if let Some(bowler) = crease.bowler {
            self.ensure_on_side(
                owner,
                bowler,
                innings.sides.bowling,
                ValidationError::NotInBowlingSide,
            )
            .await?;
        }
        Ok(())
    }

    // Teams and players.

    /// Create a team owned by the current user.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] for a blank name, or a store
    /// error.
    #[tracing::instrument(skip(self))]
    pub async fn create_team(
        &self,
        name: &str,
        short_name: Option<&str>,
    ) -> ScoringResult<Team, S> {
        let owner = self.user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName("team name").into());
        }
        let team = Team {
            id: TeamId::new(),
            owner,
            name: name.to_string(),
            short_name: short_name
                .map(str::trim)
                .filter(|short| !short.is_empty())
                .map(str::to_string),
        };
        self.within(self.store.insert(team.clone().into_record()), ScoringError::from)
            .await?;
        tracing::debug!(team = %team.id, "team created");
        Ok(team)
    }

    /// Add a player to one of the user's teams.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown team and
    /// [`ValidationError::EmptyName`] for a blank name.
    #[tracing::instrument(skip(self), fields(team = %team))]
    pub async fn add_player(
        &self,
        team: TeamId,
        name: &str,
        role: Option<PlayerRole>,
    ) -> ScoringResult<Player, S> {
        let owner = self.user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName("player name").into());
        }
        self.fetch::<Team>(owner, team).await?;
        let player = Player {
            id: PlayerId::new(),
            owner,
            team,
            name: name.to_string(),
            role,
        };
        self.within(self.store.insert(player.clone().into_record()), ScoringError::from)
            .await?;
        tracing::debug!(player = %player.id, "player added");
        Ok(player)
    }

    /// The user's teams, by name.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or the store fails.
    pub async fn list_teams(&self) -> ScoringResult<Vec<Team>, S> {
        let owner = self.user()?;
        self.values(
            Query::new(Filter::table(Table::Teams).eq(Column::Owner, owner))
                .ascending(Column::Name),
        )
        .await
    }

    /// A team's players, by name.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown team.
    pub async fn team_players(&self, team: TeamId) -> ScoringResult<Vec<Player>, S> {
        let owner = self.user()?;
        self.fetch::<Team>(owner, team).await?;
        self.values(
            Query::new(
                Filter::table(Table::Players)
                    .eq(Column::Owner, owner)
                    .eq(Column::Team, team),
            )
            .ascending(Column::Name),
        )
        .await
    }

    /// Delete a team row. Players and matches referring to it are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown team.
    #[tracing::instrument(skip(self), fields(team = %team))]
    pub async fn remove_team(&self, team: TeamId) -> ScoringResult<(), S> {
        let owner = self.user()?;
        self.fetch::<Team>(owner, team).await?;
        let filter = Filter::table(Table::Teams)
            .eq(Column::Id, team)
            .eq(Column::Owner, owner);
        self.read(self.store.delete(&filter)).await?;
        tracing::debug!("team removed");
        Ok(())
    }

    // Matches.

    /// Create a match between two of the user's teams.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for identical teams or a missing or zero
    /// overs limit, and [`ScoringError::NotFound`] for unknown teams.
    #[tracing::instrument(skip(self, new), fields(format = ?new.format))]
    pub async fn create_match(&self, new: NewMatch) -> ScoringResult<Match, S> {
        let owner = self.user()?;
        if new.team1 == new.team2 {
            return Err(ValidationError::SameTeam.into());
        }
        let overs_limit = new
            .overs
            .or_else(|| new.format.default_overs())
            .filter(|overs| *overs > 0)
            .ok_or(ValidationError::NonPositiveOvers)?;
        self.fetch::<Team>(owner, new.team1).await?;
        self.fetch::<Team>(owner, new.team2).await?;

        let game = Match {
            id: MatchId::new(),
            owner,
            team1: new.team1,
            team2: new.team2,
            format: new.format,
            overs_limit,
            venue: new.venue,
            date: new.date,
            status: MatchStatus::NotStarted,
            current_innings: 1,
            toss: None,
            sides: None,
        };
        self.within(self.store.insert(game.clone().into_record()), ScoringError::from)
            .await?;
        tracing::debug!(game = %game.id, overs_limit, "match created");
        Ok(game)
    }

    /// The user's matches, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or the store fails.
    pub async fn list_matches(&self) -> ScoringResult<Vec<Match>, S> {
        let owner = self.user()?;
        self.values(
            Query::new(Filter::table(Table::Matches).eq(Column::Owner, owner))
                .descending(Column::Date),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown match.
    pub async fn load_match(&self, game: MatchId) -> ScoringResult<Match, S> {
        let owner = self.user()?;
        Ok(self.fetch::<Match>(owner, game).await?.value)
    }

    /// Record the toss, start the match and open the first innings.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error if the toss was already recorded and a
    /// validation error if the winner is not playing.
    #[tracing::instrument(skip(self), fields(game = %game))]
    pub async fn resolve_toss(
        &self,
        game: MatchId,
        winner: TeamId,
        decision: TossDecision,
    ) -> ScoringResult<Innings, S> {
        let owner = self.user()?;
        let current = self.fetch::<Match>(owner, game).await?;
        let (started, innings) =
            lifecycle::resolve_toss(&current.value, Toss { winner, decision })?;

        let mut tx = self.store.begin(None);
        tx.update(started.into_record(), current.version)
            .insert(innings.clone().into_record());
        self.within(tx.commit(), ScoringError::from).await?;

        tracing::debug!(
            innings = %innings.id,
            batting = %innings.sides.batting,
            "toss resolved, first innings opened"
        );
        Ok(innings)
    }

    /// The innings being played now.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error before the toss and
    /// [`ScoringError::NotFound`] if the innings row is missing.
    pub async fn current_innings(&self, game: MatchId) -> ScoringResult<Innings, S> {
        let owner = self.user()?;
        let game = self.fetch::<Match>(owner, game).await?.value;
        if game.sides.is_none() {
            return Err(LifecycleError::NotInProgress(game.status).into());
        }
        let query = Query::new(
            Filter::table(Table::Innings)
                .eq(Column::Owner, owner)
                .eq(Column::Match, game.id)
                .eq(Column::Number, game.current_innings),
        );
        self.values::<Innings>(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ScoringError::not_found(Innings::NAME, game.id))
    }

    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown innings.
    pub async fn load_innings(&self, innings: InningsId) -> ScoringResult<Innings, S> {
        let owner = self.user()?;
        Ok(self.fetch::<Innings>(owner, innings).await?.value)
    }

    /// Load an innings and its match, refusing anything but the live innings
    /// of an in-progress match.
    ///
    /// Writes based on this read must [`check`](crate::store::Transaction::check)
    /// the match version so a concurrent completion or innings change fails
    /// the commit.
    async fn live_innings(
        &self,
        owner: UserId,
        innings: InningsId,
    ) -> ScoringResult<(Versioned<Innings>, Versioned<Match>), S> {
        let innings = self.fetch::<Innings>(owner, innings).await?;
        let game = self.fetch::<Match>(owner, innings.value.match_id).await?;
        game.value.status.ensure_in_progress()?;
        if game.value.current_innings != innings.value.number {
            return Err(
                LifecycleError::NotCurrentInnings(innings.value.number).into(),
            );
        }
        Ok((innings, game))
    }

    // Players in the middle.

    /// Put players at the crease. Ends left `None` are cleared.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a batter is not in the batting side,
    /// the bowler is not in the bowling side, or both batters are the same
    /// player.
    #[tracing::instrument(skip(self), fields(innings = %innings))]
    pub async fn select_players(
        &self,
        innings: InningsId,
        crease: Crease,
    ) -> ScoringResult<Innings, S> {
        let owner = self.user()?;
        let _guard = self.lock_innings(innings).await?;
        let (current, game) = self.live_innings(owner, innings).await?;
        self.ensure_crease(owner, &current.value, crease).await?;

        let mut next = current.value;
        next.crease = crease;
        let mut tx = self.store.begin(None);
        tx.check(Table::Matches, game.value.key(), game.version)
            .update(next.clone().into_record(), current.version);
        self.within(tx.commit(), ScoringError::from).await?;
        tracing::debug!(?crease, "players selected");
        Ok(next)
    }

    /// Swap striker and non-striker by hand.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the innings is live.
    #[tracing::instrument(skip(self), fields(innings = %innings))]
    pub async fn swap_strike(&self, innings: InningsId) -> ScoringResult<Innings, S> {
        let owner = self.user()?;
        let _guard = self.lock_innings(innings).await?;
        let (current, game) = self.live_innings(owner, innings).await?;

        let mut next = current.value;
        next.crease = next.crease.swapped();
        let mut tx = self.store.begin(None);
        tx.check(Table::Matches, game.value.key(), game.version)
            .update(next.clone().into_record(), current.version);
        self.within(tx.commit(), ScoringError::from).await?;
        tracing::debug!("strike swapped");
        Ok(next)
    }

    // Scoring.

    /// Record a delivery bowled with the given players in the middle.
    ///
    /// The delivery, the innings totals and both figures are committed in one
    /// batch guarded by the last sequence number read, so nothing is written
    /// if another writer got there first.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a missing or wrong player, runs out
    /// of range or a closed innings; a lifecycle error unless the innings is
    /// live; [`ScoringError::Conflict`] if the innings moved underneath.
    #[tracing::instrument(skip(self, crease), fields(innings = %innings))]
    pub async fn record_delivery(
        &self,
        innings: InningsId,
        crease: Crease,
        input: DeliveryInput,
    ) -> ScoringResult<RecordedDelivery, S> {
        ends(crease)?;
        input.validate()?;
        self.record(innings, Some(crease), input).await
    }

    /// Record a delivery using the players stored on the innings.
    ///
    /// # Errors
    ///
    /// As [`Scorer::record_delivery`].
    #[tracing::instrument(skip(self), fields(innings = %innings))]
    pub async fn record_at_crease(
        &self,
        innings: InningsId,
        input: DeliveryInput,
    ) -> ScoringResult<RecordedDelivery, S> {
        input.validate()?;
        self.record(innings, None, input).await
    }

    async fn record(
        &self,
        innings: InningsId,
        crease: Option<Crease>,
        input: DeliveryInput,
    ) -> ScoringResult<RecordedDelivery, S> {
        let owner = self.user()?;
        let _guard = self.lock_innings(innings).await?;
        let (current, game) = self.live_innings(owner, innings).await?;
        let crease = crease.unwrap_or(current.value.crease);
        let ends = ends(crease)?;
        if let Some(reason) = current.value.closed_reason(game.value.overs_limit) {
            return Err(ValidationError::InningsClosed(reason).into());
        }
        self.ensure_crease(owner, &current.value, crease).await?;

        let last_sequence = self.last_delivery(innings).await?.map(|d| d.sequence);
        let delivery = next_delivery(&current.value, last_sequence, ends, input);
        let scored = Scored::new(&delivery, current.value.total_overs);

        let mut next = current.value.clone();
        next.apply(&scored);

        let batting_row = self
            .figure::<BattingFigure>(innings, ends.striker)
            .await?;
        let bowling_row = self
            .figure::<BowlingFigure>(innings, ends.bowler)
            .await?;

        let mut tx = self.store.begin(Some(SequenceGuard {
            innings,
            expected_last: last_sequence,
        }));
        tx.check(Table::Matches, game.value.key(), game.version)
            .insert(delivery.clone().into_record())
            .update(next.clone().into_record(), current.version);

        let batting = match batting_row {
            Some(row) => {
                let mut figure = row.value;
                figure.apply(&scored);
                tx.update(figure.clone().into_record(), row.version);
                figure
            }
            None => {
                let count = self.count_figures(Table::BattingFigures, innings).await?;
                let mut figure =
                    BattingFigure::new(&current.value, ends.striker, next_position(count));
                figure.apply(&scored);
                tx.insert(figure.clone().into_record());
                figure
            }
        };
        let bowling = match bowling_row {
            Some(row) => {
                let mut figure = row.value;
                figure.apply(&scored);
                tx.update(figure.clone().into_record(), row.version);
                figure
            }
            None => {
                let count = self.count_figures(Table::BowlingFigures, innings).await?;
                let mut figure =
                    BowlingFigure::new(&current.value, ends.bowler, next_position(count));
                figure.apply(&scored);
                tx.insert(figure.clone().into_record());
                figure
            }
        };

        self.within(tx.commit(), ScoringError::from).await?;
        tracing::debug!(
            sequence = delivery.sequence,
            runs = next.total_runs,
            wickets = next.total_wickets,
            overs = %next.total_overs,
            "delivery recorded"
        );

        Ok(RecordedDelivery {
            classified: scored.classified,
            delivery,
            innings: next,
            batting,
            bowling,
        })
    }

    async fn count_figures(&self, table: Table, innings: InningsId) -> ScoringResult<usize, S> {
        let query = Query::new(Filter::table(table).eq(Column::Innings, innings));
        Ok(self.read(self.store.query(&query)).await?.len())
    }

    /// Retract the most recent delivery of an innings.
    ///
    /// Aggregates are recomputed from the remaining log, figures of players
    /// who no longer appear in it are removed, and the players in the middle
    /// go back to where they were when the retracted ball was bowled. Returns
    /// `None` when the log is already empty.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the innings is live, and
    /// [`ScoringError::Conflict`] if the innings moved underneath.
    #[tracing::instrument(skip(self), fields(innings = %innings))]
    pub async fn undo_last_delivery(
        &self,
        innings: InningsId,
    ) -> ScoringResult<Option<Retracted>, S> {
        let owner = self.user()?;
        let _guard = self.lock_innings(innings).await?;
        let (current, game) = self.live_innings(owner, innings).await?;

        let mut log = self
            .list::<Delivery>(
                Query::new(Filter::table(Table::Deliveries).eq(Column::Innings, innings))
                    .ascending(Column::Sequence),
            )
            .await?;
        let Some(last) = log.pop() else {
            tracing::trace!("nothing to undo");
            return Ok(None);
        };

        let card = Scorecard::replay(&current.value, log.iter().map(|row| &row.value));
        let mut restored = card.innings.clone();
        restored.crease = last.value.crease();

        let by_innings = |table| Query::new(Filter::table(table).eq(Column::Innings, innings));
        let batting_rows = self
            .list::<BattingFigure>(by_innings(Table::BattingFigures))
            .await?;
        let bowling_rows = self
            .list::<BowlingFigure>(by_innings(Table::BowlingFigures))
            .await?;

        let mut tx = self.store.begin(Some(SequenceGuard {
            innings,
            expected_last: Some(last.value.sequence),
        }));
        tx.check(Table::Matches, game.value.key(), game.version)
            .delete(Table::Deliveries, last.value.key(), last.version)
            .update(restored.clone().into_record(), current.version);

        for row in batting_rows {
            match card.batting_figure(row.value.player) {
                Some(figure) if *figure == row.value => {}
                Some(figure) => {
                    tx.update(figure.clone().into_record(), row.version);
                }
                None => {
                    tx.delete(Table::BattingFigures, row.value.key(), row.version);
                }
            }
        }
        for row in bowling_rows {
            match card.bowling_figure(row.value.player) {
                Some(figure) if *figure == row.value => {}
                Some(figure) => {
                    tx.update(figure.clone().into_record(), row.version);
                }
                None => {
                    tx.delete(Table::BowlingFigures, row.value.key(), row.version);
                }
            }
        }

        self.within(tx.commit(), ScoringError::from).await?;
        tracing::debug!(
            sequence = last.value.sequence,
            runs = restored.total_runs,
            overs = %restored.total_overs,
            "last delivery undone"
        );

        Ok(Some(Retracted {
            delivery: last.value,
            innings: restored,
        }))
    }

    // Lifecycle.

    /// Open the second innings with the sides reversed.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the match is in progress and still in
    /// its first innings.
    #[tracing::instrument(skip(self), fields(game = %game))]
    pub async fn start_second_innings(&self, game: MatchId) -> ScoringResult<Innings, S> {
        let owner = self.user()?;
        let current = self.fetch::<Match>(owner, game).await?;
        let (next, innings) = lifecycle::start_second_innings(&current.value)?;

        let mut tx = self.store.begin(None);
        tx.update(next.into_record(), current.version)
            .insert(innings.clone().into_record());
        self.within(tx.commit(), ScoringError::from).await?;

        tracing::debug!(innings = %innings.id, "second innings opened");
        Ok(innings)
    }

    /// End the match. No further deliveries or undo are accepted afterwards.
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error unless the match is in progress.
    #[tracing::instrument(skip(self), fields(game = %game))]
    pub async fn complete_match(&self, game: MatchId) -> ScoringResult<Match, S> {
        let owner = self.user()?;
        let current = self.fetch::<Match>(owner, game).await?;
        let done = lifecycle::complete(&current.value)?;
        self.within(
            self.store.update(done.clone().into_record(), current.version),
            ScoringError::from,
        )
        .await?;
        tracing::debug!("match completed");
        Ok(done)
    }

    // Reads.

    /// The last `limit` deliveries of an innings, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown innings.
    pub async fn recent_deliveries(
        &self,
        innings: InningsId,
        limit: usize,
    ) -> ScoringResult<Vec<Delivery>, S> {
        let owner = self.user()?;
        self.fetch::<Innings>(owner, innings).await?;
        self.values(
            Query::new(Filter::table(Table::Deliveries).eq(Column::Innings, innings))
                .descending(Column::Sequence)
                .limit(limit),
        )
        .await
    }

    /// Current state of a match: every innings with its figures.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::NotFound`] for an unknown match.
    pub async fn scoreboard(&self, game: MatchId) -> ScoringResult<Scoreboard, S> {
        let owner = self.user()?;
        let game = self.fetch::<Match>(owner, game).await?.value;
        let by_match = |table| {
            Query::new(
                Filter::table(table)
                    .eq(Column::Owner, owner)
                    .eq(Column::Match, game.id),
            )
        };
        let innings = self.values::<Innings>(by_match(Table::Innings)).await?;
        let batting = self
            .values::<BattingFigure>(by_match(Table::BattingFigures))
            .await?;
        let bowling = self
            .values::<BowlingFigure>(by_match(Table::BowlingFigures))
            .await?;

        let mut players = Vec::new();
        for team in [game.team1, game.team2] {
            players.extend(
                self.values::<Player>(Query::new(
                    Filter::table(Table::Players)
                        .eq(Column::Owner, owner)
                        .eq(Column::Team, team),
                ))
                .await?,
            );
        }

        Ok(Scoreboard::build(game, innings, batting, bowling, &players))
    }

    /// Career leaders across all of the user's innings.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or the store fails.
    pub async fn statistics(&self, limit: usize) -> ScoringResult<Statistics, S> {
        let owner = self.user()?;
        let owned = |table| Query::new(Filter::table(table).eq(Column::Owner, owner));
        let batting = self
            .values::<BattingFigure>(owned(Table::BattingFigures))
            .await?;
        let bowling = self
            .values::<BowlingFigure>(owned(Table::BowlingFigures))
            .await?;
        let players = self.values::<Player>(owned(Table::Players)).await?;
        Ok(Statistics::build(&batting, &bowling, &players, limit))
    }
}

impl<S, I> Scorer<S, I>
where
    S: SubscribableStore + Clone + 'static,
    I: Identity + Clone + 'static,
{
    /// Watch a match. Configure callbacks on the returned builder, then
    /// `start()` it.
    #[must_use]
    pub fn watch_match(&self, game: MatchId) -> MatchFeed<S, I> {
        MatchFeed::new(self.clone(), game)
    }
}

/// The three players a delivery needs.
fn ends(crease: Crease) -> Result<Ends, ValidationError> {
    let striker = crease.striker.ok_or(ValidationError::MissingStriker)?;
    let non_striker = crease.non_striker.ok_or(ValidationError::MissingNonStriker)?;
    let bowler = crease.bowler.ok_or(ValidationError::MissingBowler)?;
    if striker == non_striker {
        return Err(ValidationError::SameBatter);
    }
    Ok(Ends {
        striker,
        non_striker,
        bowler,
    })
}
