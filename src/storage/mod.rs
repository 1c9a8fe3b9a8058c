//! Storage engine module
//!
//! This module contains the storage engine components:
//! - Cells, rows and the snapshot codec
//! - Atomic whole-file replacement
//! - Session table locks
//! - Tables keyed by primary key
//! - Write-ahead log

pub mod file;
pub mod lock;
pub mod row;
pub mod table;
pub mod wal;

pub use lock::{LockMode, TableLock};
pub use row::{Cell, Row};
pub use table::Table;
pub use wal::{LogEntry, WriteAheadLog};
