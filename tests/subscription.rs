//! Integration tests for live match feeds.

mod common;

use common::{date, fixture};
use scorebook::{
    DeliveryInput, MatchFormat, NewMatch, Scoreboard, Scorer, TossDecision,
    model::{Crease, UserId},
    store::{ChangeKind, Table, inmemory},
};
use tokio::{
    sync::mpsc,
    time::{Duration, timeout},
};

fn scorer() -> Scorer<inmemory::Store, UserId> {
    Scorer::new(inmemory::Store::new(), UserId::new())
}

async fn next_board(rx: &mut mpsc::UnboundedReceiver<Scoreboard>) -> Scoreboard {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for scoreboard")
        .expect("feed closed")
}

fn total_runs(board: &Scoreboard) -> u32 {
    board.current().map_or(0, |card| card.innings.total_runs)
}

#[tokio::test]
async fn feed_starts_with_the_current_scoreboard_then_follows_play() {
    let f = fixture(scorer(), 20).await;
    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(2))
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let feed = f
        .scorer
        .watch_match(f.game.id)
        .on_update(move |board| {
            let _ = tx.send(board.clone());
        })
        .start()
        .await
        .unwrap();
    assert!(feed.is_running());

    assert_eq!(total_runs(&next_board(&mut rx).await), 2);

    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(4))
        .await
        .unwrap();
    let board = next_board(&mut rx).await;
    assert_eq!(total_runs(&board), 6);
    assert_eq!(board.current().unwrap().innings.total_overs.to_string(), "0.2");

    f.scorer.undo_last_delivery(f.innings.id).await.unwrap();
    assert_eq!(total_runs(&next_board(&mut rx).await), 2);

    feed.stop().await.unwrap();
}

#[tokio::test]
async fn one_delivery_is_one_batch_of_row_changes() {
    let f = fixture(scorer(), 20).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let feed = f
        .scorer
        .watch_match(f.game.id)
        .on_change(move |change| {
            let _ = tx.send((change.record.table(), change.kind));
        })
        .start()
        .await
        .unwrap();

    f.scorer
        .record_at_crease(f.innings.id, DeliveryInput::runs(1))
        .await
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(
            timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    seen.sort();
    let mut expected = vec![
        (Table::Innings, ChangeKind::Updated),
        (Table::Deliveries, ChangeKind::Inserted),
        (Table::BattingFigures, ChangeKind::Inserted),
        (Table::BowlingFigures, ChangeKind::Inserted),
    ];
    expected.sort();
    assert_eq!(seen, expected);

    feed.stop().await.unwrap();
}

#[tokio::test]
async fn feed_ignores_other_matches() {
    let f = fixture(scorer(), 20).await;

    let other = f
        .scorer
        .create_match(NewMatch::new(f.away.id, f.home.id, MatchFormat::T20, date()))
        .await
        .unwrap();
    let other_innings = f
        .scorer
        .resolve_toss(other.id, f.away.id, TossDecision::Bat)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let feed = f
        .scorer
        .watch_match(f.game.id)
        .on_update(move |board| {
            let _ = tx.send(board.clone());
        })
        .start()
        .await
        .unwrap();
    next_board(&mut rx).await;

    f.scorer
        .record_delivery(
            other_innings.id,
            Crease::new(f.bowlers[0].id, f.bowlers[1].id, f.batters[0].id),
            DeliveryInput::runs(6),
        )
        .await
        .unwrap();

    assert!(
        timeout(Duration::from_millis(100), rx.recv()).await.is_err(),
        "feed fired for another match"
    );

    feed.stop().await.unwrap();
}

#[tokio::test]
async fn feed_for_unknown_match_fails_to_start() {
    let f = fixture(scorer(), 20).await;
    let stranger = Scorer::new(f.scorer.store().clone(), UserId::new());
    assert!(stranger.watch_match(f.game.id).start().await.is_err());
}
