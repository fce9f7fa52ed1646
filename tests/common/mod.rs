//! Shared fixture: two teams, a match and an open first innings.

#![allow(dead_code)]

use chrono::NaiveDate;
use scorebook::{
    MatchFormat, NewMatch, Scorer, TossDecision,
    identity::Identity,
    model::{Crease, Innings, Match, Player, Team},
    store::EntityStore,
};

pub struct Fixture<S, I> {
    pub scorer: Scorer<S, I>,
    pub home: Team,
    pub away: Team,
    /// Home players, in batting order.
    pub batters: Vec<Player>,
    /// Away players.
    pub bowlers: Vec<Player>,
    pub game: Match,
    /// First innings, home batting.
    pub innings: Innings,
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

/// Set up a match of `overs` overs and open the first innings with the first
/// two home batters and the first away bowler at the crease.
pub async fn fixture<S, I>(scorer: Scorer<S, I>, overs: u32) -> Fixture<S, I>
where
    S: EntityStore,
    I: Identity,
{
    let home = scorer.create_team("Harbour CC", Some("HCC")).await.unwrap();
    let away = scorer.create_team("Hillside", None).await.unwrap();

    let mut batters = Vec::new();
    for n in 1..=11 {
        batters.push(
            scorer
                .add_player(home.id, &format!("Home {n:02}"), None)
                .await
                .unwrap(),
        );
    }
    let mut bowlers = Vec::new();
    for n in 1..=3 {
        bowlers.push(
            scorer
                .add_player(away.id, &format!("Away {n:02}"), None)
                .await
                .unwrap(),
        );
    }

    let game = scorer
        .create_match(NewMatch::new(home.id, away.id, MatchFormat::Custom, date()).with_overs(overs))
        .await
        .unwrap();
    let innings = scorer
        .resolve_toss(game.id, home.id, TossDecision::Bat)
        .await
        .unwrap();
    let innings = scorer
        .select_players(
            innings.id,
            Crease::new(batters[0].id, batters[1].id, bowlers[0].id),
        )
        .await
        .unwrap();
    let game = scorer.load_match(game.id).await.unwrap();

    Fixture {
        scorer,
        home,
        away,
        batters,
        bowlers,
        game,
        innings,
    }
}
