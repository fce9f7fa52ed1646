//! Persistence layer abstractions.
//!
//! This module describes the storage contract the scorer runs against
//! ([`EntityStore`] and [`SubscribableStore`]), the query and write vocabulary
//! ([`Filter`], [`Query`], [`Write`]), transactions, and a reference in-memory
//! implementation.
use std::{fmt, future::Future, pin::Pin};

use futures_core::Stream;
pub use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    concurrency::ConcurrencyConflict,
    entity::{Column, Record, RowKey, Table, Value},
    model::InningsId,
};

pub mod inmemory;

/// A row together with its version.
///
/// Versions start at 1 on insert and increase by one on every update. They are
/// the position compared by optimistic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Versioned<U> {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }
}

/// Rows of one table whose columns equal the given values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub table: Table,
    pub conditions: Vec<(Column, Value)>,
}

impl Filter {
    /// Every row of `table`.
    #[must_use]
    pub const fn table(table: Table) -> Self {
        Self {
            table,
            conditions: Vec::new(),
        }
    }

    /// Narrow to rows where `column == value`.
    #[must_use]
    pub fn eq(mut self, column: Column, value: impl Into<Value>) -> Self {
        self.conditions.push((column, value.into()));
        self
    }

    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        record.table() == self.table
            && self
                .conditions
                .iter()
                .all(|(column, value)| record.column(*column).as_ref() == Some(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: Column,
    pub direction: Direction,
}

/// A filtered, optionally ordered and limited read.
///
/// Without an ordering, rows come back in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub filter: Filter,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub const fn new(filter: Filter) -> Self {
        Self {
            filter,
            order: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn ascending(mut self, column: Column) -> Self {
        self.order = Some(OrderBy {
            column,
            direction: Direction::Ascending,
        });
        self
    }

    #[must_use]
    pub fn descending(mut self, column: Column) -> Self {
        self.order = Some(OrderBy {
            column,
            direction: Direction::Descending,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}

/// One write inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Create a row. Conflicts if the key is already taken.
    Insert(Record),
    /// Replace a row whose current version is `expected_version`.
    Update { record: Record, expected_version: u64 },
    /// Remove a row whose current version is `expected_version`.
    Delete {
        table: Table,
        key: RowKey,
        expected_version: u64,
    },
    /// Require a row to still be at `expected_version` without changing it.
    Check {
        table: Table,
        key: RowKey,
        expected_version: u64,
    },
}

impl Write {
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Insert(record) | Self::Update { record, .. } => record.table(),
            Self::Delete { table, .. } | Self::Check { table, .. } => *table,
        }
    }
}

/// Commit precondition on an innings' delivery log.
///
/// The commit only goes ahead if the highest delivery sequence number stored
/// for `innings` is still `expected_last` (`None` for an empty log).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGuard {
    pub innings: InningsId,
    pub expected_last: Option<u64>,
}

/// Error from commits with version checking.
#[derive(Debug, Error)]
pub enum CommitError<StoreError>
where
    StoreError: std::error::Error,
{
    /// Concurrency conflict: a row or the delivery log moved since it was
    /// read.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict<u64>),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error> CommitError<StoreError> {
    pub const fn store(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Result of a successful commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Committed {
    /// Store-wide commit counter after this commit.
    pub commit: u64,
    pub writes: usize,
}

/// Convenience alias for commit outcomes returned by entity stores.
pub type CommitOutcome<Err> = Result<Committed, CommitError<Err>>;

/// Batch of writes committed atomically.
///
/// Writes are accumulated in the transaction and persisted together when
/// `commit()` is called. If the transaction is dropped without calling
/// `commit()`, the writes are discarded.
pub struct Transaction<'a, S: EntityStore> {
    store: &'a S,
    guard: Option<SequenceGuard>,
    writes: Vec<Write>,
    committed: bool,
}

impl<'a, S: EntityStore> Transaction<'a, S> {
    pub const fn new(store: &'a S, guard: Option<SequenceGuard>) -> Self {
        Self {
            store,
            guard,
            writes: Vec::new(),
            committed: false,
        }
    }

    pub fn insert(&mut self, record: Record) -> &mut Self {
        tracing::trace!(table = %record.table(), "insert staged");
        self.writes.push(Write::Insert(record));
        self
    }

    pub fn update(&mut self, record: Record, expected_version: u64) -> &mut Self {
        tracing::trace!(table = %record.table(), expected_version, "update staged");
        self.writes.push(Write::Update {
            record,
            expected_version,
        });
        self
    }

    pub fn delete(&mut self, table: Table, key: RowKey, expected_version: u64) -> &mut Self {
        tracing::trace!(%table, expected_version, "delete staged");
        self.writes.push(Write::Delete {
            table,
            key,
            expected_version,
        });
        self
    }

    /// Fail the commit unless the row is still at `expected_version`.
    pub fn check(&mut self, table: Table, key: RowKey, expected_version: u64) -> &mut Self {
        tracing::trace!(%table, expected_version, "version check staged");
        self.writes.push(Write::Check {
            table,
            key,
            expected_version,
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commit every staged write, or none of them.
    ///
    /// An empty transaction commits nothing and succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Conflict`] if the guard or any expected version
    /// no longer holds, or [`CommitError::Store`] if persistence fails.
    pub async fn commit(mut self) -> CommitOutcome<S::Error> {
        let writes = std::mem::take(&mut self.writes);
        self.committed = true;
        let Some(writes) = NonEmpty::from_vec(writes) else {
            tracing::trace!("empty transaction; nothing to commit");
            return Ok(Committed {
                commit: 0,
                writes: 0,
            });
        };
        tracing::debug!(
            write_count = writes.len(),
            guard = ?self.guard,
            "committing transaction"
        );
        self.store.commit(self.guard, writes).await
    }
}

impl<S: EntityStore> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.committed && !self.writes.is_empty() {
            tracing::trace!(
                guard = ?self.guard,
                write_count = self.writes.len(),
                "transaction dropped without commit; discarding staged writes"
            );
        }
    }
}

/// Abstraction over the persistence collaborator.
///
/// Every method completes or fails in bounded time from the caller's
/// perspective; the scorer additionally wraps each call in a timeout.
pub trait EntityStore: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert a new row, returning its version.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Conflict`] if the key already exists.
    fn insert(
        &self,
        record: Record,
    ) -> impl Future<Output = Result<u64, CommitError<Self::Error>>> + Send + '_;

    /// Replace a row if its version is still `expected_version`, returning the
    /// new version.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Conflict`] if the row changed or is gone.
    fn update(
        &self,
        record: Record,
        expected_version: u64,
    ) -> impl Future<Output = Result<u64, CommitError<Self::Error>>> + Send + '_;

    /// Delete every row matching `filter`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn delete<'a>(
        &'a self,
        filter: &'a Filter,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

    /// Load rows matching the query.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn query<'a>(
        &'a self,
        query: &'a Query,
    ) -> impl Future<Output = Result<Vec<Versioned<Record>>, Self::Error>> + Send + 'a;

    /// Load one row by key.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn get(
        &self,
        table: Table,
        key: RowKey,
    ) -> impl Future<Output = Result<Option<Versioned<Record>>, Self::Error>> + Send + '_;

    /// Apply a batch of writes atomically.
    ///
    /// Either every write is applied and one change notification carrying all
    /// of them is published, or nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Conflict`] if the guard or any expected version
    /// does not hold, or [`CommitError::Store`] if persistence fails.
    fn commit(
        &self,
        guard: Option<SequenceGuard>,
        writes: NonEmpty<Write>,
    ) -> impl Future<Output = CommitOutcome<Self::Error>> + Send + '_;

    /// Begin a transaction guarded by `guard`.
    fn begin(&self, guard: Option<SequenceGuard>) -> Transaction<'_, Self>
    where
        Self: Sized,
    {
        Transaction::new(self, guard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        })
    }
}

/// A committed change to one row. Deleted rows carry their last value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub record: Record,
    pub version: u64,
}

/// Changes from one commit that matched a subscription's filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    pub commit: u64,
    pub changes: Vec<Change>,
}

/// Type alias for the boxed change stream returned by
/// [`SubscribableStore::subscribe`].
pub type ChangeStream<E> = Pin<Box<dyn Stream<Item = Result<ChangeBatch, E>> + Send + 'static>>;

/// A store that pushes change notifications.
///
/// This is a separate trait because not every store supports push
/// notifications. The in-memory store uses `tokio::sync::broadcast`.
pub trait SubscribableStore: EntityStore {
    /// Subscribe to future commits touching rows that match any of `filters`.
    ///
    /// An empty filter list matches every row. Only commits made after this
    /// call are delivered; batches arrive in commit order.
    fn subscribe(&self, filters: &[Filter]) -> ChangeStream<Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Team, TeamId, UserId};

    fn team(name: &str) -> Record {
        Record::Team(Team {
            id: TeamId::new(),
            owner: UserId::new(),
            name: name.to_string(),
            short_name: None,
        })
    }

    #[test]
    fn filter_without_conditions_matches_whole_table() {
        let filter = Filter::table(Table::Teams);
        assert!(filter.matches(&team("Lions")));
        assert!(!Filter::table(Table::Players).matches(&team("Lions")));
    }

    #[test]
    fn filter_conditions_must_all_hold() {
        let record = team("Lions");
        let owner = record.owner();
        assert!(
            Filter::table(Table::Teams)
                .eq(Column::Owner, owner)
                .eq(Column::Name, "Lions")
                .matches(&record)
        );
        assert!(
            !Filter::table(Table::Teams)
                .eq(Column::Owner, owner)
                .eq(Column::Name, "Tigers")
                .matches(&record)
        );
    }

    #[test]
    fn filter_on_missing_column_never_matches() {
        assert!(
            !Filter::table(Table::Teams)
                .eq(Column::Sequence, 1_u64)
                .matches(&team("Lions"))
        );
    }

    #[test]
    fn query_builder_sets_order_and_limit() {
        let query = Query::new(Filter::table(Table::Deliveries))
            .descending(Column::Sequence)
            .limit(6);
        assert_eq!(
            query.order,
            Some(OrderBy {
                column: Column::Sequence,
                direction: Direction::Descending,
            })
        );
        assert_eq!(query.limit, Some(6));
    }

    #[test]
    fn commit_error_conflict_is_transparent() {
        let err: CommitError<std::io::Error> = ConcurrencyConflict {
            expected: Some(1),
            actual: Some(2),
        }
        .into();
        assert!(err.to_string().starts_with("concurrency conflict"));
    }
}
