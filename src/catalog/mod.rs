//! Catalog module
//!
//! This module contains the column types, schema definitions, databases and
//! the manager that owns them.

pub mod database;
pub mod manager;
pub mod schema;
pub mod types;

pub use database::Database;
pub use manager::{Manager, ReplaySummary, SessionId, REPLAY_SESSION};
pub use schema::Column;
pub use types::ColumnType;
