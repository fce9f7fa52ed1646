#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use scorebook_core::test;
pub use scorebook_core::{
    aggregate,
    aggregate::{Apply, Scorecard},
    config,
    config::ScorerConfig,
    delivery,
    delivery::{DeliveryInput, DismissalKind, Extras},
    error,
    error::{LifecycleError, ScoringError, ValidationError},
    identity,
    identity::{Identity, Session},
    lifecycle, model,
    model::{Crease, MatchFormat, NewMatch, TossDecision},
    overs,
    overs::Overs,
    projection,
    projection::{Scoreboard, Statistics},
    scorer,
    scorer::{RecordedDelivery, Retracted, Scorer},
    subscription,
    subscription::{MatchFeed, SubscriptionHandle},
};

pub mod store {
    pub use scorebook_core::{
        concurrency::ConcurrencyConflict,
        entity::{Column, Entity, Record, RowKey, Table, Value},
        store::{
            Change, ChangeBatch, ChangeKind, ChangeStream, CommitError, CommitOutcome, Committed,
            Direction, EntityStore, Filter, NonEmpty, OrderBy, Query, SequenceGuard,
            SubscribableStore, Transaction, Versioned, Write,
        },
    };

    pub use scorebook_core::store::inmemory;
}
