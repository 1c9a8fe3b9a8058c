//! Query execution module
//!
//! This module contains the filter conditions, the per-statement query
//! tables with their joins, and the seam through which the manager hands
//! statements back to the statement layer during recovery.

pub mod condition;
pub mod query_table;

pub use condition::{Comparator, Condition, Operand, Predicate};
pub use query_table::{filter, resolve_column, QueryColumn, QueryTable};

use crate::catalog::{Manager, SessionId};

/// Executes one statement on behalf of a session.
///
/// Implemented by the statement layer. [`Manager::recover`] calls it to
/// re-run committed WAL statements under [`crate::catalog::REPLAY_SESSION`].
pub trait StatementExecutor {
    fn evaluate(&self, manager: &Manager, statement: &str, session: SessionId)
        -> anyhow::Result<()>;
}
