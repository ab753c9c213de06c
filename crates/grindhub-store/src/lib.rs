//! # grindhub-store
//!
//! SQLite persistence for GrindHub. The crate exposes a synchronous
//! `Database` handle wrapping a `rusqlite::Connection` with typed helpers
//! for every collaborator the real-time layer consults: room membership,
//! message history, practice problems, daily goals with todos, and study
//! sessions.

pub mod database;
pub mod goals;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod problems;
pub mod rooms;
pub mod sessions;

mod error;
mod row;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
