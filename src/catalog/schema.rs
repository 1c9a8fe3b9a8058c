//! Schema definitions for CellarDB
//!
//! This module defines column metadata and the conversion of statement
//! literals into typed cells.

use super::types::ColumnType;
use crate::config::DEFAULT_STRING_LENGTH;
use crate::error::{Error, Result};
use crate::storage::Cell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, always lower-case
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Is this the primary key?
    pub primary: bool,
    /// Is NULL rejected?
    pub not_null: bool,
    /// Max length for string values
    pub max_length: usize,
}

impl Column {
    /// Create a new nullable, non-primary column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into().to_lowercase(),
            column_type,
            primary: false,
            not_null: false,
            max_length: DEFAULT_STRING_LENGTH,
        }
    }

    /// Create a string column with the given max length
    pub fn string(name: impl Into<String>, max_length: usize) -> Self {
        Self::new(name, ColumnType::String).max_length(max_length)
    }

    /// Set primary key flag. A primary column is always NOT NULL.
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        if primary {
            self.not_null = true;
        }
        self
    }

    /// Set NOT NULL flag
    pub fn not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null || self.primary;
        self
    }

    /// Set max length
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Convert a literal as written in a statement into a cell of this
    /// column's type. `null` (any case) yields `Cell::Null`; string literals
    /// may be wrapped in single quotes.
    pub fn parse_literal(&self, text: &str) -> Result<Cell> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("null") {
            return Ok(Cell::Null);
        }

        let mismatch = || Error::TypeMismatch {
            column: self.name.clone(),
            expected: self.column_type.to_string(),
            found: text.to_string(),
        };

        match self.column_type {
            ColumnType::Int => text.parse().map(Cell::Int).map_err(|_| mismatch()),
            ColumnType::Long => text.parse().map(Cell::Long).map_err(|_| mismatch()),
            ColumnType::Double => text.parse().map(Cell::Double).map_err(|_| mismatch()),
            ColumnType::String => {
                let unquoted = text
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .unwrap_or(text);
                Ok(Cell::String(unquoted.to_string()))
            }
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.column_type)?;
        if self.column_type == ColumnType::String {
            write!(f, "({})", self.max_length)?;
        }
        if self.primary {
            write!(f, " PRIMARY KEY")?;
        } else if self.not_null {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_creation() {
        let id = Column::new("ID", ColumnType::Int).primary(true);
        assert_eq!(id.name, "id");
        assert!(id.primary);
        assert!(id.not_null);

        // primary wins over an explicit nullable request
        let id = id.not_null(false);
        assert!(id.not_null);

        let name = Column::string("name", 32);
        assert!(!name.not_null);
        assert_eq!(name.max_length, 32);
        assert_eq!(name.to_string(), "name STRING(32)");
    }

    #[test]
    fn test_parse_literal() {
        let id = Column::new("id", ColumnType::Int);
        assert_eq!(id.parse_literal("42").unwrap(), Cell::Int(42));
        assert_eq!(id.parse_literal("NULL").unwrap(), Cell::Null);
        assert!(matches!(
            id.parse_literal("'x'"),
            Err(Error::TypeMismatch { .. })
        ));

        let score = Column::new("score", ColumnType::Double);
        assert_eq!(score.parse_literal("1.5").unwrap(), Cell::Double(1.5));

        let big = Column::new("big", ColumnType::Long);
        assert_eq!(
            big.parse_literal("9000000000").unwrap(),
            Cell::Long(9_000_000_000)
        );

        let name = Column::string("name", 10);
        assert_eq!(
            name.parse_literal("'alice'").unwrap(),
            Cell::String("alice".to_string())
        );
    }
}
