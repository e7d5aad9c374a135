//! # agora-store
//!
//! Durable storage for the Agora chat core, backed by the forum's SQLite
//! database.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the private message
//! table plus read-only lookups into the forum's `users` and `sessions`
//! tables. [`SharedDatabase`] makes the handle usable from async tasks.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod shared;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use shared::SharedDatabase;
