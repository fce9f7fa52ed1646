//! Live match feeds.
//!
//! A feed keeps a [`Scoreboard`] current as the match is scored, so a display
//! can redraw without polling. Every commit touching the match produces one
//! round of callbacks: `on_change` once per changed row, then `on_update` with
//! the refreshed scoreboard.
//!
//! # Example
//!
//! ```ignore
//! let feed = scorer
//!     .watch_match(game.id)
//!     .on_update(|board| println!("{}", board.current().map_or(0, |c| c.innings.total_runs)))
//!     .start()
//!     .await?;
//!
//! // Later, shut down gracefully
//! feed.stop().await?;
//! ```

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use crate::{
    entity::{Column, Table},
    error::ScoringError,
    identity::Identity,
    model::MatchId,
    projection::Scoreboard,
    scorer::Scorer,
    store::{Change, Filter, SubscribableStore},
};

/// Tables whose rows make up a scoreboard.
const WATCHED: [Table; 5] = [
    Table::Matches,
    Table::Innings,
    Table::Deliveries,
    Table::BattingFigures,
    Table::BowlingFigures,
];

/// Errors that end a feed.
#[derive(Debug, Error)]
pub enum SubscriptionError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// Loading the scoreboard failed.
    #[error(transparent)]
    Scoring(#[from] ScoringError<StoreError>),
    /// The feed task panicked.
    #[error("subscription task panicked")]
    TaskPanicked,
}

/// Handle to a running feed.
///
/// Dropping the handle does **not** stop the feed. Call [`stop()`] for
/// graceful shutdown.
///
/// [`stop()`]: SubscriptionHandle::stop
pub struct SubscriptionHandle<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: JoinHandle<Result<(), SubscriptionError<StoreError>>>,
}

impl<StoreError> SubscriptionHandle<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// Stop the feed and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the feed's error if it failed before being stopped.
    pub async fn stop(mut self) -> Result<(), SubscriptionError<StoreError>> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .map_err(|_| SubscriptionError::TaskPanicked)?
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

type ChangeCallback = Box<dyn Fn(&Change) + Send + Sync + 'static>;
type UpdateCallback = Box<dyn Fn(&Scoreboard) + Send + Sync + 'static>;

/// Builder for a live match feed.
///
/// Created via [`Scorer::watch_match()`].
pub struct MatchFeed<S, I> {
    scorer: Scorer<S, I>,
    game: MatchId,
    on_change: Option<ChangeCallback>,
    on_update: Option<UpdateCallback>,
}

impl<S, I> MatchFeed<S, I>
where
    S: SubscribableStore + Clone + 'static,
    I: Identity + Clone + 'static,
{
    pub(crate) const fn new(scorer: Scorer<S, I>, game: MatchId) -> Self {
        Self {
            scorer,
            game,
            on_change: None,
            on_update: None,
        }
    }

    /// Register a callback invoked for every changed row.
    #[must_use]
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.on_change = Some(Box::new(callback));
        self
    }

    /// Register a callback invoked with the scoreboard, once on start and
    /// again after every commit touching the match.
    ///
    /// Callbacks run on the feed task. Blocking one delays the next update.
    #[must_use]
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Scoreboard) + Send + Sync + 'static,
    {
        self.on_update = Some(Box::new(callback));
        self
    }

    /// Start the feed.
    ///
    /// The change stream is attached before the initial scoreboard is read,
    /// so no commit falls between the two.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial scoreboard cannot be loaded.
    #[tracing::instrument(skip(self), fields(game = %self.game))]
    pub async fn start(self) -> Result<SubscriptionHandle<S::Error>, SubscriptionError<S::Error>> {
        let Self {
            scorer,
            game,
            on_change,
            on_update,
        } = self;

        let filters: Vec<Filter> = WATCHED
            .into_iter()
            .map(|table| {
                let column = if table == Table::Matches {
                    Column::Id
                } else {
                    Column::Match
                };
                Filter::table(table).eq(column, game)
            })
            .collect();
        let mut stream = scorer.store().subscribe(&filters);

        let board = scorer.scoreboard(game).await?;
        if let Some(ref callback) = on_update {
            callback(&board);
        }
        tracing::debug!("feed started");

        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        tracing::debug!("feed stopped");
                        break;
                    }
                    batch = stream.next() => {
                        let Some(result) = batch else {
                            tracing::debug!("change stream ended");
                            break;
                        };

                        match result {
                            Ok(batch) => {
                                tracing::trace!(
                                    commit = batch.commit,
                                    changes = batch.changes.len(),
                                    "batch received"
                                );
                                if let Some(ref callback) = on_change {
                                    for change in &batch.changes {
                                        callback(change);
                                    }
                                }
                            }
                            Err(error) => {
                                tracing::warn!(%error, "change stream error, reloading scoreboard");
                            }
                        }

                        let board = match scorer.scoreboard(game).await {
                            Ok(board) => board,
                            Err(error) => {
                                tracing::error!(%error, "failed to refresh scoreboard");
                                return Err(error.into());
                            }
                        };
                        if let Some(ref callback) = on_update {
                            callback(&board);
                        }
                    }
                }
            }
            Ok(())
        });

        Ok(SubscriptionHandle {
            stop_tx: Some(stop_tx),
            task,
        })
    }
}
