//! Error types for CellarDB
//!
//! This module defines all error types used throughout the storage and
//! execution core.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::SessionId;

/// The main error type for CellarDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Catalog error: database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Catalog error: no database selected for session {0}")]
    NoDatabaseSelected(SessionId),

    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Catalog error: table '{0}' must declare exactly one primary key column")]
    MultiplePrimaryKey(String),

    #[error("Catalog error: column '{0}' duplicates")]
    DuplicateColumnName(String),

    #[error("Catalog error: column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Catalog error: column reference '{0}' is ambiguous")]
    AmbiguousColumn(String),

    // ========== Constraint Errors ==========
    #[error("Constraint error: duplicate primary key")]
    DuplicateKey,

    #[error("Constraint error: primary key not found")]
    KeyNotFound,

    #[error("Constraint error: null value not allowed for column '{0}'")]
    NullValue(String),

    #[error("Constraint error: expected {expected} value for column '{column}', got {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Constraint error: value of length {length} exceeds max length {max} of column '{column}'")]
    ValueTooLong {
        column: String,
        length: usize,
        max: usize,
    },

    #[error("Constraint error: expected {expected} values, got {found}")]
    SchemaLengthMismatch { expected: usize, found: usize },

    // ========== Storage Errors ==========
    #[error("Storage error: I/O failure on '{}': {source}", .path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: corrupted snapshot '{}': {reason}", .path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Storage error: invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    // ========== Lock Errors ==========
    #[error("Lock error: session {session} timed out waiting for table '{table}'")]
    LockTimeout { table: String, session: SessionId },
}

impl Error {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::StorageIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for CellarDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Catalog error: table 'users' not found");

        let err = Error::SchemaLengthMismatch {
            expected: 3,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "Constraint error: expected 3 values, got 2"
        );
    }

    #[test]
    fn test_io_error_carries_path() {
        let err = Error::io(
            "/tmp/db/log",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/db/log"));
        assert!(matches!(err, Error::StorageIo { .. }));
    }
}
