//! Column types for CellarDB
//!
//! This module defines the value kinds a column can declare.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Double-precision floating point
    Double,
    /// Length-bounded character string
    String,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Long => write!(f, "LONG"),
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::String => write!(f, "STRING"),
        }
    }
}
