//! Persistence-facing view of the model.
//!
//! A store sees every entity as a [`Record`] living in a [`Table`] under a
//! [`RowKey`], and filters or orders rows by [`Column`] values. [`Entity`] is
//! the typed bridge: each model struct names its table and exposes the columns
//! the scorer queries on.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    BattingFigure, BowlingFigure, Delivery, Innings, InningsId, Match, Player, PlayerId, Team,
    UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Teams,
    Players,
    Matches,
    Innings,
    Deliveries,
    BattingFigures,
    BowlingFigures,
}

impl Table {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Teams => "teams",
            Self::Players => "players",
            Self::Matches => "matches",
            Self::Innings => "innings",
            Self::Deliveries => "deliveries",
            Self::BattingFigures => "batting_figures",
            Self::BowlingFigures => "bowling_figures",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Queryable columns. Not every table has every column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    Owner,
    Team,
    Match,
    Innings,
    Player,
    /// Innings number.
    Number,
    /// Delivery sequence number.
    Sequence,
    /// Batting or bowling order.
    Position,
    Name,
    Date,
}

/// A column value, comparable across rows of one table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Id(Uuid),
    Int(u64),
    Text(String),
    Date(NaiveDate),
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Int(n)
    }
}

impl From<u8> for Value {
    fn from(n: u8) -> Self {
        Self::Int(u64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

macro_rules! id_values {
    ($($id:ty),* $(,)?) => {
        $(
            impl From<$id> for Value {
                fn from(id: $id) -> Self {
                    Self::Id(id.as_uuid())
                }
            }
        )*
    };
}

id_values!(
    crate::model::UserId,
    crate::model::TeamId,
    crate::model::PlayerId,
    crate::model::MatchId,
    crate::model::InningsId,
    crate::model::DeliveryId,
);

/// Primary key of a row. Figures are keyed by `(innings, player)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    Id(Uuid),
    Figure {
        innings: InningsId,
        player: PlayerId,
    },
}

/// A typed entity that can be stored as a [`Record`].
pub trait Entity: Clone + Send + Sync + 'static {
    const TABLE: Table;
    /// Singular name used in error messages.
    const NAME: &'static str;

    fn key(&self) -> RowKey;
    fn owner(&self) -> UserId;
    /// Value of `column`, or `None` if this table has no such column.
    fn column(&self, column: Column) -> Option<Value>;
    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;
}

/// Any stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum Record {
    Team(Team),
    Player(Player),
    Match(Match),
    Innings(Innings),
    Delivery(Delivery),
    Batting(BattingFigure),
    Bowling(BowlingFigure),
}

macro_rules! each_record {
    ($record:expr, $row:ident => $body:expr) => {
        match $record {
            Record::Team($row) => $body,
            Record::Player($row) => $body,
            Record::Match($row) => $body,
            Record::Innings($row) => $body,
            Record::Delivery($row) => $body,
            Record::Batting($row) => $body,
            Record::Bowling($row) => $body,
        }
    };
}

impl Record {
    #[must_use]
    pub fn table(&self) -> Table {
        fn table_of<E: Entity>(_: &E) -> Table {
            E::TABLE
        }
        each_record!(self, row => table_of(row))
    }

    #[must_use]
    pub fn key(&self) -> RowKey {
        each_record!(self, row => row.key())
    }

    #[must_use]
    pub fn owner(&self) -> UserId {
        each_record!(self, row => row.owner())
    }

    #[must_use]
    pub fn column(&self, column: Column) -> Option<Value> {
        each_record!(self, row => row.column(column))
    }
}

macro_rules! entity {
    (
        $ty:ty => $variant:ident, $table:ident, $name:literal;
        key($key_row:ident) => $key:expr;
        column($row:ident, $column:ident) => $lookup:expr $(;)?
    ) => {
        impl Entity for $ty {
            const TABLE: Table = Table::$table;
            const NAME: &'static str = $name;

            fn key(&self) -> RowKey {
                let $key_row = self;
                $key
            }

            fn owner(&self) -> UserId {
                self.owner
            }

            fn column(&self, $column: Column) -> Option<Value> {
                let $row = self;
                $lookup
            }

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: Record) -> Option<Self> {
                match record {
                    Record::$variant(row) => Some(row),
                    _ => None,
                }
            }
        }
    };
}

entity! {
    Team => Team, Teams, "team";
    key(row) => RowKey::Id(row.id.as_uuid());
    column(row, column) => match column {
        Column::Id => Some(row.id.into()),
        Column::Owner => Some(row.owner.into()),
        Column::Name => Some(row.name.as_str().into()),
        _ => None,
    };
}

entity! {
    Player => Player, Players, "player";
    key(row) => RowKey::Id(row.id.as_uuid());
    column(row, column) => match column {
        Column::Id => Some(row.id.into()),
        Column::Owner => Some(row.owner.into()),
        Column::Team => Some(row.team.into()),
        Column::Name => Some(row.name.as_str().into()),
        _ => None,
    };
}

entity! {
    Match => Match, Matches, "match";
    key(row) => RowKey::Id(row.id.as_uuid());
    column(row, column) => match column {
        Column::Id | Column::Match => Some(row.id.into()),
        Column::Owner => Some(row.owner.into()),
        Column::Date => Some(row.date.into()),
        _ => None,
    };
}

entity! {
    Innings => Innings, Innings, "innings";
    key(row) => RowKey::Id(row.id.as_uuid());
    column(row, column) => match column {
        Column::Id | Column::Innings => Some(row.id.into()),
        Column::Owner => Some(row.owner.into()),
        Column::Match => Some(row.match_id.into()),
        Column::Number => Some(row.number.into()),
        _ => None,
    };
}

entity! {
    Delivery => Delivery, Deliveries, "delivery";
    key(row) => RowKey::Id(row.id.as_uuid());
    column(row, column) => match column {
        Column::Id => Some(row.id.into()),
        Column::Owner => Some(row.owner.into()),
        Column::Match => Some(row.match_id.into()),
        Column::Innings => Some(row.innings.into()),
        Column::Sequence => Some(row.sequence.into()),
        _ => None,
    };
}

// Figures are keyed by (innings, player); at most one row per player per innings.
entity! {
    BattingFigure => Batting, BattingFigures, "batting figure";
    key(row) => RowKey::Figure {
        innings: row.innings,
        player: row.player,
    };
    column(row, column) => match column {
        Column::Owner => Some(row.owner.into()),
        Column::Match => Some(row.match_id.into()),
        Column::Innings => Some(row.innings.into()),
        Column::Player => Some(row.player.into()),
        Column::Position => Some(row.position.into()),
        _ => None,
    };
}

entity! {
    BowlingFigure => Bowling, BowlingFigures, "bowling figure";
    key(row) => RowKey::Figure {
        innings: row.innings,
        player: row.player,
    };
    column(row, column) => match column {
        Column::Owner => Some(row.owner.into()),
        Column::Match => Some(row.match_id.into()),
        Column::Innings => Some(row.innings.into()),
        Column::Player => Some(row.player.into()),
        Column::Position => Some(row.position.into()),
        _ => None,
    };
}
