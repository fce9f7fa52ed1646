//! In-memory entity store.
//!
//! This module provides [`Store`], a thread-safe in-memory implementation of
//! [`EntityStore`] and [`SubscribableStore`] suitable for tests, demos and
//! single-process embedding.
//!
//! # Example
//!
//! ```
//! use scorebook_core::store::inmemory;
//!
//! let store = inmemory::Store::new();
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use nonempty::NonEmpty;
use tokio::sync::broadcast;
use tokio_stream::{
    StreamExt as _,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};

use crate::{
    concurrency::ConcurrencyConflict,
    entity::{Record, RowKey, Table},
    store::{
        Change, ChangeBatch, ChangeKind, ChangeStream, CommitError, CommitOutcome, Committed,
        Direction, EntityStore, Filter, Query, SequenceGuard, SubscribableStore, Versioned, Write,
    },
};

const LIVE_BUFFER_CAPACITY: usize = 1024;

type Rows = BTreeMap<RowKey, Versioned<Record>>;

/// In-memory entity store that keeps each table in an ordered map.
///
/// Commits are applied under a single write lock, so a batch is observed
/// either completely or not at all. Change notifications are published in
/// commit order over a broadcast channel.
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<Inner>>,
    changes: broadcast::Sender<Arc<ChangeBatch>>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<Table, Rows>,
    commits: u64,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(LIVE_BUFFER_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            changes,
        }
    }

    fn apply(
        &self,
        guard: Option<SequenceGuard>,
        writes: NonEmpty<Write>,
    ) -> CommitOutcome<InMemoryError> {
        let mut inner = self.inner.write().expect("in-memory store lock poisoned");

        if let Some(guard) = guard {
            let actual = inner.last_sequence(guard.innings.as_uuid());
            if actual != guard.expected_last {
                tracing::debug!(
                    expected = ?guard.expected_last,
                    ?actual,
                    "delivery log moved, rejecting commit"
                );
                return Err(ConcurrencyConflict {
                    expected: guard.expected_last,
                    actual,
                }
                .into());
            }
        }

        let write_count = writes.len();
        let (staged, changes) = inner.stage(writes)?;
        for ((table, key), row) in staged {
            let rows = inner.tables.entry(table).or_default();
            match row {
                Some(row) => {
                    rows.insert(key, row);
                }
                None => {
                    rows.remove(&key);
                }
            }
        }
        inner.commits += 1;
        let commit = inner.commits;

        // Published under the lock so subscribers see commits in order.
        let _ = self.changes.send(Arc::new(ChangeBatch { commit, changes }));
        drop(inner);

        tracing::debug!(commit, write_count, "writes committed");
        Ok(Committed {
            commit,
            writes: write_count,
        })
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

type Staged = HashMap<(Table, RowKey), Option<Versioned<Record>>>;

impl Inner {
    fn row(&self, staged: &Staged, table: Table, key: RowKey) -> Option<Versioned<Record>> {
        match staged.get(&(table, key)) {
            Some(row) => row.clone(),
            None => self
                .tables
                .get(&table)
                .and_then(|rows| rows.get(&key))
                .cloned(),
        }
    }

    fn last_sequence(&self, innings: uuid::Uuid) -> Option<u64> {
        self.tables
            .get(&Table::Deliveries)?
            .values()
            .filter_map(|row| match &row.value {
                Record::Delivery(delivery) if delivery.innings.as_uuid() == innings => {
                    Some(delivery.sequence)
                }
                _ => None,
            })
            .max()
    }

    /// Check every write against current state plus earlier writes in the
    /// same batch, without touching the tables.
    fn stage(
        &self,
        writes: NonEmpty<Write>,
    ) -> Result<(Staged, Vec<Change>), ConcurrencyConflict<u64>> {
        let mut staged = Staged::new();
        let mut changes = Vec::with_capacity(writes.len());

        for write in writes {
            let table = write.table();
            match write {
                Write::Insert(record) => {
                    let key = record.key();
                    if let Some(existing) = self.row(&staged, table, key) {
                        tracing::debug!(%table, ?key, "row already exists, rejecting insert");
                        return Err(ConcurrencyConflict {
                            expected: None,
                            actual: Some(existing.version),
                        });
                    }
                    staged.insert(
                        (table, key),
                        Some(Versioned {
                            value: record.clone(),
                            version: 1,
                        }),
                    );
                    changes.push(Change {
                        kind: ChangeKind::Inserted,
                        record,
                        version: 1,
                    });
                }
                Write::Update {
                    record,
                    expected_version,
                } => {
                    let key = record.key();
                    let actual = self.row(&staged, table, key).map(|row| row.version);
                    if actual != Some(expected_version) {
                        tracing::debug!(%table, expected_version, ?actual, "version mismatch, rejecting update");
                        return Err(ConcurrencyConflict {
                            expected: Some(expected_version),
                            actual,
                        });
                    }
                    let version = expected_version + 1;
                    staged.insert(
                        (table, key),
                        Some(Versioned {
                            value: record.clone(),
                            version,
                        }),
                    );
                    changes.push(Change {
                        kind: ChangeKind::Updated,
                        record,
                        version,
                    });
                }
                Write::Delete {
                    table,
                    key,
                    expected_version,
                } => {
                    let existing = self.row(&staged, table, key);
                    let actual = existing.as_ref().map(|row| row.version);
                    let Some(existing) = existing.filter(|_| actual == Some(expected_version))
                    else {
                        tracing::debug!(%table, expected_version, ?actual, "version mismatch, rejecting delete");
                        return Err(ConcurrencyConflict {
                            expected: Some(expected_version),
                            actual,
                        });
                    };
                    staged.insert((table, key), None);
                    changes.push(Change {
                        kind: ChangeKind::Deleted,
                        record: existing.value,
                        version: existing.version,
                    });
                }
                Write::Check {
                    table,
                    key,
                    expected_version,
                } => {
                    let actual = self.row(&staged, table, key).map(|row| row.version);
                    if actual != Some(expected_version) {
                        tracing::debug!(%table, expected_version, ?actual, "version mismatch, rejecting commit");
                        return Err(ConcurrencyConflict {
                            expected: Some(expected_version),
                            actual,
                        });
                    }
                }
            }
        }

        Ok((staged, changes))
    }
}

/// Error type for in-memory store.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryError {
    /// A subscriber fell behind and missed notifications.
    #[error("change subscriber lagged behind by {0} commits")]
    Lagged(u64),
}

impl EntityStore for Store {
    type Error = InMemoryError;

    #[tracing::instrument(skip(self, record), fields(table = %record.table()))]
    fn insert(
        &self,
        record: Record,
    ) -> impl Future<Output = Result<u64, CommitError<Self::Error>>> + Send + '_ {
        let result = self
            .apply(None, NonEmpty::new(Write::Insert(record)))
            .map(|_| 1);
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, record), fields(table = %record.table()))]
    fn update(
        &self,
        record: Record,
        expected_version: u64,
    ) -> impl Future<Output = Result<u64, CommitError<Self::Error>>> + Send + '_ {
        let result = self
            .apply(
                None,
                NonEmpty::new(Write::Update {
                    record,
                    expected_version,
                }),
            )
            .map(|_| expected_version + 1);
        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, filter), fields(table = %filter.table))]
    fn delete<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a {
        let mut inner = self.inner.write().expect("in-memory store lock poisoned");
        let mut changes = Vec::new();
        if let Some(rows) = inner.tables.get_mut(&filter.table) {
            rows.retain(|_, row| {
                if filter.matches(&row.value) {
                    changes.push(Change {
                        kind: ChangeKind::Deleted,
                        record: row.value.clone(),
                        version: row.version,
                    });
                    false
                } else {
                    true
                }
            });
        }

        let removed = changes.len();
        if removed > 0 {
            inner.commits += 1;
            let commit = inner.commits;
            let _ = self.changes.send(Arc::new(ChangeBatch { commit, changes }));
        }
        drop(inner);

        tracing::debug!(removed, "rows deleted");
        std::future::ready(Ok(removed))
    }

    #[tracing::instrument(skip(self, query), fields(table = %query.filter.table))]
    fn query<'a>(
        &'a self,
        query: &'a Query,
    ) -> impl Future<Output = Result<Vec<Versioned<Record>>, Self::Error>> + Send + 'a {
        let mut result: Vec<Versioned<Record>> = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner
                .tables
                .get(&query.filter.table)
                .map(|rows| {
                    rows.values()
                        .filter(|row| query.filter.matches(&row.value))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if let Some(order) = query.order {
            result.sort_by(|a, b| {
                let ordering = a.value.column(order.column).cmp(&b.value.column(order.column));
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            result.truncate(limit);
        }

        tracing::trace!(rows_loaded = result.len(), "query complete");
        std::future::ready(Ok(result))
    }

    fn get(
        &self,
        table: Table,
        key: RowKey,
    ) -> impl Future<Output = Result<Option<Versioned<Record>>, Self::Error>> + Send + '_ {
        let row = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner
                .tables
                .get(&table)
                .and_then(|rows| rows.get(&key))
                .cloned()
        };
        std::future::ready(Ok(row))
    }

    #[tracing::instrument(skip(self, writes), fields(write_count = writes.len()))]
    fn commit(
        &self,
        guard: Option<SequenceGuard>,
        writes: NonEmpty<Write>,
    ) -> impl Future<Output = CommitOutcome<Self::Error>> + Send + '_ {
        std::future::ready(self.apply(guard, writes))
    }
}

impl SubscribableStore for Store {
    fn subscribe(&self, filters: &[Filter]) -> ChangeStream<Self::Error> {
        let filters = filters.to_vec();
        let receiver = self.changes.subscribe();

        Box::pin(
            BroadcastStream::new(receiver).filter_map(move |received| match received {
                Ok(batch) => {
                    let changes: Vec<Change> = batch
                        .changes
                        .iter()
                        .filter(|change| {
                            filters.is_empty()
                                || filters.iter().any(|filter| filter.matches(&change.record))
                        })
                        .cloned()
                        .collect();
                    if changes.is_empty() {
                        None
                    } else {
                        Some(Ok(ChangeBatch {
                            commit: batch.commit,
                            changes,
                        }))
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change subscriber lagged");
                    Some(Err(InMemoryError::Lagged(skipped)))
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tokio_stream::StreamExt as _;

    use super::*;
    use crate::{
        delivery::Extras,
        entity::{Column, Entity},
        model::{
            Delivery, DeliveryId, Match, MatchFormat, MatchId, MatchStatus, PlayerId, Team, TeamId,
            UserId,
        },
    };

    fn team(owner: UserId, name: &str) -> Team {
        Team {
            id: TeamId::new(),
            owner,
            name: name.to_string(),
            short_name: None,
        }
    }

    fn delivery(innings: crate::model::InningsId, sequence: u64) -> Delivery {
        Delivery {
            id: DeliveryId::new(),
            owner: UserId::new(),
            match_id: MatchId::new(),
            innings,
            sequence,
            over: 0,
            ball: 1,
            striker: PlayerId::new(),
            non_striker: PlayerId::new(),
            bowler: PlayerId::new(),
            runs: 0,
            extras: Extras::None,
            wicket: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_returns_version_one() {
        let store = Store::new();
        let lions = team(UserId::new(), "Lions");
        let key = lions.key();
        let version = store.insert(lions.clone().into_record()).await.unwrap();
        assert_eq!(version, 1);

        let row = store.get(Table::Teams, key).await.unwrap().unwrap();
        assert_eq!(row.version, 1);
        assert_eq!(Team::from_record(row.value), Some(lions));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = Store::new();
        let lions = team(UserId::new(), "Lions");
        store.insert(lions.clone().into_record()).await.unwrap();

        let result = store.insert(lions.into_record()).await;
        assert!(matches!(
            result,
            Err(CommitError::Conflict(ConcurrencyConflict {
                expected: None,
                actual: Some(1)
            }))
        ));
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let store = Store::new();
        let mut lions = team(UserId::new(), "Lions");
        store.insert(lions.clone().into_record()).await.unwrap();

        lions.name = "Lions XI".into();
        assert_eq!(store.update(lions.clone().into_record(), 1).await.unwrap(), 2);

        let stale = store.update(lions.into_record(), 1).await;
        assert!(matches!(stale, Err(CommitError::Conflict(_))));
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = Store::new();
        let owner = UserId::new();
        let existing = team(owner, "Lions");
        store.insert(existing.clone().into_record()).await.unwrap();

        let fresh = team(owner, "Tigers");
        let writes = NonEmpty::from((
            Write::Insert(fresh.clone().into_record()),
            vec![Write::Insert(existing.into_record())],
        ));
        assert!(store.commit(None, writes).await.is_err());
        assert!(store.get(Table::Teams, fresh.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn version_check_blocks_batch_without_touching_the_row() {
        let store = Store::new();
        let owner = UserId::new();
        let mut lions = team(owner, "Lions");
        store.insert(lions.clone().into_record()).await.unwrap();
        let key = lions.key();

        let checked = |version, other: &Team| {
            NonEmpty::from((
                Write::Check {
                    table: Table::Teams,
                    key,
                    expected_version: version,
                },
                vec![Write::Insert(other.clone().into_record())],
            ))
        };
        store.commit(None, checked(1, &team(owner, "Tigers"))).await.unwrap();
        let row = store.get(Table::Teams, key).await.unwrap().unwrap();
        assert_eq!(row.version, 1);

        lions.name = "Lions XI".into();
        store.update(lions.clone().into_record(), 1).await.unwrap();
        let bears = team(owner, "Bears");
        let stale = store.commit(None, checked(1, &bears)).await;
        assert!(matches!(
            stale,
            Err(CommitError::Conflict(ConcurrencyConflict {
                expected: Some(1),
                actual: Some(2)
            }))
        ));
        assert!(store.get(Table::Teams, bears.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sequence_guard_rejects_moved_log() {
        let store = Store::new();
        let innings = crate::model::InningsId::new();
        let guard = SequenceGuard {
            innings,
            expected_last: None,
        };
        store
            .commit(
                Some(guard),
                NonEmpty::new(Write::Insert(delivery(innings, 1).into_record())),
            )
            .await
            .unwrap();

        let stale = store
            .commit(
                Some(guard),
                NonEmpty::new(Write::Insert(delivery(innings, 2).into_record())),
            )
            .await;
        assert!(matches!(
            stale,
            Err(CommitError::Conflict(ConcurrencyConflict {
                expected: None,
                actual: Some(1)
            }))
        ));
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = Store::new();
        let innings = crate::model::InningsId::new();
        for sequence in [2, 1, 3] {
            store
                .insert(delivery(innings, sequence).into_record())
                .await
                .unwrap();
        }

        let query = Query::new(Filter::table(Table::Deliveries).eq(Column::Innings, innings))
            .descending(Column::Sequence)
            .limit(2);
        let rows = store.query(&query).await.unwrap();
        let sequences: Vec<u64> = rows
            .into_iter()
            .filter_map(|row| Delivery::from_record(row.value))
            .map(|d| d.sequence)
            .collect();
        assert_eq!(sequences, vec![3, 2]);
    }

    #[tokio::test]
    async fn delete_by_filter_reports_count() {
        let store = Store::new();
        let owner = UserId::new();
        store.insert(team(owner, "Lions").into_record()).await.unwrap();
        store.insert(team(owner, "Tigers").into_record()).await.unwrap();
        store
            .insert(team(UserId::new(), "Eagles").into_record())
            .await
            .unwrap();

        let removed = store
            .delete(&Filter::table(Table::Teams).eq(Column::Owner, owner))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        let left = store
            .query(&Query::new(Filter::table(Table::Teams)))
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_receive_matching_changes_only() {
        let store = Store::new();
        let owner = UserId::new();
        let game = Match {
            id: MatchId::new(),
            owner,
            team1: TeamId::new(),
            team2: TeamId::new(),
            format: MatchFormat::T20,
            overs_limit: 20,
            venue: None,
            date: NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            status: MatchStatus::NotStarted,
            current_innings: 1,
            toss: None,
            sides: None,
        };
        let mut stream =
            store.subscribe(&[Filter::table(Table::Matches).eq(Column::Match, game.id)]);

        store.insert(team(owner, "Lions").into_record()).await.unwrap();
        store.insert(game.clone().into_record()).await.unwrap();

        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.commit, 2);
        assert_eq!(batch.changes.len(), 1);
        assert_eq!(batch.changes[0].kind, ChangeKind::Inserted);
        assert_eq!(batch.changes[0].record, game.into_record());
    }
}
