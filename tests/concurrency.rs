//! Integration tests for conflicts, identity and store failures.

mod common;

use std::time::Duration;

use common::fixture;
use scorebook::{
    DeliveryInput, LifecycleError, Scorer, ScorerConfig, ScoringError, Session,
    aggregate::{Ends, next_delivery},
    model::{Match, MatchStatus, UserId},
    store::{Entity, EntityStore, Table, Write, inmemory},
};
use scorebook_core::test::FlakyStore;

#[tokio::test]
async fn interleaved_writer_causes_a_conflict_and_nothing_is_half_applied() {
    let store = FlakyStore::new(inmemory::Store::new());
    let f = fixture(Scorer::new(store.clone(), UserId::new()), 20).await;
    let before = f.scorer.load_innings(f.innings.id).await.unwrap();

    // another device records a ball at the same moment
    let rival = next_delivery(
        &before,
        None,
        Ends {
            striker: f.batters[0].id,
            non_striker: f.batters[1].id,
            bowler: f.bowlers[0].id,
        },
        DeliveryInput::runs(2),
    );
    store.interleave(Write::Insert(rival.clone().into_record()));

    let err = f
        .scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(4))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::Conflict(_)), "{err:?}");
    assert!(err.is_retryable());

    // only the rival's row landed
    assert_eq!(f.scorer.load_innings(f.innings.id).await.unwrap(), before);
    let log = f.scorer.recent_deliveries(f.innings.id, 10).await.unwrap();
    assert_eq!(log, vec![rival]);

    // retrying from a fresh read goes through
    let retried = f
        .scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(4))
        .await
        .unwrap();
    assert_eq!(retried.delivery.sequence, 2);
}

/// The match row as another device would see it right now.
async fn match_row(store: &FlakyStore<inmemory::Store>, game: &Match) -> (Match, u64) {
    let row = store
        .get(Table::Matches, game.key())
        .await
        .unwrap()
        .unwrap();
    (Match::from_record(row.value).unwrap(), row.version)
}

#[tokio::test]
async fn delivery_racing_a_match_completion_is_rejected() {
    let store = FlakyStore::new(inmemory::Store::new());
    let f = fixture(Scorer::new(store.clone(), UserId::new()), 20).await;
    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(1))
        .await
        .unwrap();
    let before = f.scorer.load_innings(f.innings.id).await.unwrap();

    // another device completes the match while this one is scoring
    let (mut done, version) = match_row(&store, &f.game).await;
    done.status = MatchStatus::Completed;
    store.interleave(Write::Update {
        record: done.into_record(),
        expected_version: version,
    });

    let err = f
        .scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(4))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::Conflict(_)), "{err:?}");
    assert_eq!(f.scorer.load_innings(f.innings.id).await.unwrap(), before);
    let log = f.scorer.recent_deliveries(f.innings.id, 10).await.unwrap();
    assert_eq!(log.len(), 1);

    // a fresh read sees the completion
    let err = f
        .scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(4))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ScoringError::Lifecycle(LifecycleError::Completed)),
        "{err:?}"
    );
}

#[tokio::test]
async fn undo_racing_an_innings_change_is_rejected() {
    let store = FlakyStore::new(inmemory::Store::new());
    let f = fixture(Scorer::new(store.clone(), UserId::new()), 20).await;
    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(2))
        .await
        .unwrap();
    let before = f.scorer.load_innings(f.innings.id).await.unwrap();

    // another device moves the match on to the second innings
    let (mut moved, version) = match_row(&store, &f.game).await;
    moved.current_innings = 2;
    store.interleave(Write::Update {
        record: moved.into_record(),
        expected_version: version,
    });

    let err = f
        .scorer
        .undo_last_delivery(f.innings.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::Conflict(_)), "{err:?}");
    assert_eq!(f.scorer.load_innings(f.innings.id).await.unwrap(), before);

    let err = f
        .scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(1))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            ScoringError::Lifecycle(LifecycleError::NotCurrentInnings(1))
        ),
        "{err:?}"
    );
}

#[tokio::test]
async fn operations_require_a_signed_in_user() {
    let session = Session::new();
    let scorer = Scorer::new(inmemory::Store::new(), session.clone());

    let err = scorer.create_team("Home", None).await.unwrap_err();
    assert!(matches!(err, ScoringError::Unauthenticated));

    session.sign_in(UserId::new());
    let team = scorer.create_team("Home", None).await.unwrap();

    session.sign_out();
    let err = scorer.team_players(team.id).await.unwrap_err();
    assert!(matches!(err, ScoringError::Unauthenticated));
}

#[tokio::test]
async fn offline_store_is_reported_as_retryable() {
    let store = FlakyStore::new(inmemory::Store::new());
    let f = fixture(Scorer::new(store.clone(), UserId::new()), 20).await;

    store.go_offline();
    let err = f
        .scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ScoringError::StoreUnavailable(_)), "{err:?}");
    assert!(err.is_retryable());

    store.go_online();
    let innings = f.scorer.load_innings(f.innings.id).await.unwrap();
    assert_eq!(innings.total_runs, 0);
    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn slow_store_times_out() {
    let store = FlakyStore::new(inmemory::Store::new());
    let f = fixture(Scorer::new(store.clone(), UserId::new()), 20).await;
    let scorer = f
        .scorer
        .clone()
        .with_config(ScorerConfig::default().with_store_timeout(Duration::from_millis(20)));

    store.delay(Duration::from_millis(500));
    let err = scorer.scoreboard(f.game.id).await.unwrap_err();
    assert!(
        matches!(err, ScoringError::TimedOut(limit) if limit == Duration::from_millis(20)),
        "{err:?}"
    );
    assert!(err.is_retryable());

    store.clear_delay();
    scorer.scoreboard(f.game.id).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_deliveries_on_one_innings_are_serialized() {
    let f = fixture(
        Scorer::new(inmemory::Store::new(), UserId::new()),
        20,
    )
    .await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let scorer = f.scorer.clone();
        let innings = f.innings.id;
        tasks.push(tokio::spawn(async move {
            scorer
                .record_at_crease(innings, DeliveryInput::runs(1))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let innings = f.scorer.load_innings(f.innings.id).await.unwrap();
    assert_eq!(innings.total_runs, 8);
    assert_eq!(innings.total_overs.to_string(), "1.2");

    let mut sequences: Vec<u64> = f
        .scorer
        .recent_deliveries(f.innings.id, 100)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.sequence)
        .collect();
    sequences.reverse();
    assert_eq!(sequences, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn separate_scorers_on_one_store_never_lose_a_delivery() {
    let store = inmemory::Store::new();
    let user = UserId::new();
    let f = fixture(Scorer::new(store.clone(), user), 20).await;
    let other = Scorer::new(store, user);

    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(1))
        .await
        .unwrap();
    other
        .record_at_crease(f.innings.id, DeliveryInput::runs(2))
        .await
        .unwrap();

    let innings = other.load_innings(f.innings.id).await.unwrap();
    assert_eq!(innings.total_runs, 3);
    assert_eq!(innings.total_overs.to_string(), "0.2");
}
