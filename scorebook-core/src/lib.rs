//! Core types and services for the scorebook cricket scoring engine.
//!
//! - [`overs`] - The overs clock (`Overs`)
//! - [`delivery`] - Delivery input and the scoring rules (`DeliveryInput`, `classify`)
//! - [`model`] - Teams, players, matches, innings, deliveries and figures
//! - [`lifecycle`] - Match status transitions, toss and innings changes
//! - [`aggregate`] - Applying deliveries to innings totals and figures (`Apply`, `Scorecard`)
//! - [`projection`] - Read models (`Scoreboard`, `Statistics`)
//! - [`store`] - Persistence abstraction (`EntityStore`, `SubscribableStore`)
//! - [`scorer`] - The application service (`Scorer`)
//! - [`subscription`] - Live match feeds
//!
//! # Example
//!
//! ```
//! use scorebook_core::{scorer::Scorer, store::inmemory, model::UserId};
//!
//! let scorer = Scorer::new(inmemory::Store::new(), UserId::new());
//! ```
//!
//! Most users should depend on the [`scorebook`](https://docs.rs/scorebook)
//! crate, which re-exports these types.

pub mod aggregate;
pub mod concurrency;
pub mod config;
pub mod delivery;
pub mod entity;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod model;
pub mod overs;
pub mod projection;
pub mod scorer;
pub mod store;
pub mod subscription;
