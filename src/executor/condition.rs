//! Filter conditions
//!
//! A [`Condition`] compares a column with a literal or with another column.
//! [`Predicate`] combines conditions with AND/OR. Predicates are bound to a
//! column list before evaluation so names and literals are resolved once,
//! then evaluated row by row.

use std::cmp::Ordering;
use std::fmt;

use super::query_table::{resolve_column, QueryColumn};
use crate::error::Result;
use crate::storage::{Cell, Row};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl Comparator {
    /// Parse an operator symbol (`=`, `<>`, `!=`, `<=`, `>=`, `<`, `>`)
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Comparator::Eq),
            "<>" | "!=" => Some(Comparator::Ne),
            "<=" => Some(Comparator::Le),
            ">=" => Some(Comparator::Ge),
            "<" => Some(Comparator::Lt),
            ">" => Some(Comparator::Gt),
            _ => None,
        }
    }

    /// Does `ordering` (left compared to right) satisfy this operator?
    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Le => ordering != Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Gt => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::Eq => "=",
            Comparator::Ne => "<>",
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Gt => ">",
        };
        write!(f, "{}", symbol)
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Column reference, qualified (`t.c`) or not
    Column(String),
    /// Literal text, converted to the left column's type
    Literal(String),
}

/// `column <comparator> operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub comparator: Comparator,
    pub operand: Operand,
}

impl Condition {
    pub fn new(column: impl Into<String>, comparator: Comparator, operand: Operand) -> Self {
        Self {
            column: column.into(),
            comparator,
            operand,
        }
    }

    /// Compare a column with a literal
    pub fn literal(
        column: impl Into<String>,
        comparator: Comparator,
        literal: impl Into<String>,
    ) -> Self {
        Self::new(column, comparator, Operand::Literal(literal.into()))
    }

    /// Compare two columns
    pub fn columns(
        left: impl Into<String>,
        comparator: Comparator,
        right: impl Into<String>,
    ) -> Self {
        Self::new(left, comparator, Operand::Column(right.into()))
    }

    fn bind(&self, columns: &[QueryColumn]) -> Result<BoundCondition> {
        let left = resolve_column(columns, &self.column)?;
        let right = match &self.operand {
            Operand::Column(name) => BoundOperand::Column(resolve_column(columns, name)?),
            Operand::Literal(text) => {
                BoundOperand::Value(columns[left].column.parse_literal(text)?)
            }
        };
        Ok(BoundCondition {
            left,
            comparator: self.comparator,
            right,
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::Column(c) => write!(f, "{} {} {}", self.column, self.comparator, c),
            Operand::Literal(l) => write!(f, "{} {} {}", self.column, self.comparator, l),
        }
    }
}

/// Conditions combined with AND/OR
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition(Condition),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Resolve column names and literals against `columns`
    pub(crate) fn bind(&self, columns: &[QueryColumn]) -> Result<BoundPredicate> {
        Ok(match self {
            Predicate::Condition(c) => BoundPredicate::Condition(c.bind(columns)?),
            Predicate::And(l, r) => {
                BoundPredicate::And(Box::new(l.bind(columns)?), Box::new(r.bind(columns)?))
            }
            Predicate::Or(l, r) => {
                BoundPredicate::Or(Box::new(l.bind(columns)?), Box::new(r.bind(columns)?))
            }
        })
    }
}

impl From<Condition> for Predicate {
    fn from(condition: Condition) -> Self {
        Predicate::Condition(condition)
    }
}

#[derive(Debug)]
pub(crate) enum BoundOperand {
    Column(usize),
    Value(Cell),
}

#[derive(Debug)]
pub(crate) struct BoundCondition {
    left: usize,
    comparator: Comparator,
    right: BoundOperand,
}

impl BoundCondition {
    fn eval(&self, row: &Row) -> bool {
        let cells = row.cells();
        let right = match &self.right {
            BoundOperand::Column(i) => &cells[*i],
            BoundOperand::Value(cell) => cell,
        };
        self.comparator.matches(cells[self.left].cmp(right))
    }
}

#[derive(Debug)]
pub(crate) enum BoundPredicate {
    Condition(BoundCondition),
    And(Box<BoundPredicate>, Box<BoundPredicate>),
    Or(Box<BoundPredicate>, Box<BoundPredicate>),
}

impl BoundPredicate {
    pub(crate) fn eval(&self, row: &Row) -> bool {
        match self {
            BoundPredicate::Condition(c) => c.eval(row),
            BoundPredicate::And(l, r) => l.eval(row) && r.eval(row),
            BoundPredicate::Or(l, r) => l.eval(row) || r.eval(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparator_matches() {
        assert!(Comparator::Le.matches(Ordering::Equal));
        assert!(Comparator::Le.matches(Ordering::Less));
        assert!(!Comparator::Lt.matches(Ordering::Equal));
        assert!(Comparator::Ne.matches(Ordering::Greater));
        assert!(!Comparator::Ge.matches(Ordering::Less));
    }

    #[test]
    fn test_comparator_symbols() {
        for symbol in ["=", "<>", "<=", ">=", "<", ">"] {
            let comparator = Comparator::from_symbol(symbol).unwrap();
            assert_eq!(comparator.to_string(), symbol);
        }
        assert_eq!(Comparator::from_symbol("!="), Some(Comparator::Ne));
        assert_eq!(Comparator::from_symbol("=="), None);
    }

    #[test]
    fn test_condition_display() {
        let c = Condition::literal("age", Comparator::Ge, "18");
        assert_eq!(c.to_string(), "age >= 18");
        let c = Condition::columns("t1.id", Comparator::Eq, "t2.id");
        assert_eq!(c.to_string(), "t1.id = t2.id");
    }
}
