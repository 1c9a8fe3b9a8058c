//! Query working sets
//!
//! A [`QueryTable`] is the per-statement row set the statement layer projects
//! from: qualified columns (`table.column`) plus rows. It is built from one
//! [`Table`] or by joining two query tables. Joins are nested loops.

use tracing::debug;

use super::condition::Predicate;
use crate::catalog::Column;
use crate::error::{Error, Result};
use crate::storage::{Row, Table};

/// A column of a query table, remembering which table it came from
#[derive(Debug, Clone, PartialEq)]
pub struct QueryColumn {
    pub table: String,
    pub column: Column,
}

impl QueryColumn {
    pub fn new(table: impl Into<String>, column: Column) -> Self {
        Self {
            table: table.into(),
            column,
        }
    }

    /// Unqualified column name
    pub fn name(&self) -> &str {
        &self.column.name
    }

    /// `table.column`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table, self.column.name)
    }
}

/// Find `name` in `columns`. Qualified names (`t.c`) must match exactly;
/// bare names must match exactly one column.
pub fn resolve_column(columns: &[QueryColumn], name: &str) -> Result<usize> {
    let name = name.trim().to_lowercase();
    let found: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| match name.split_once('.') {
            Some((table, column)) => c.table == table && c.column.name == column,
            None => c.column.name == name,
        })
        .map(|(i, _)| i)
        .take(2)
        .collect();

    match (found.first(), found.get(1)) {
        (Some(&i), None) => Ok(i),
        (Some(_), Some(_)) => Err(Error::AmbiguousColumn(name)),
        (None, _) => Err(Error::ColumnNotFound(name)),
    }
}

fn check_width(columns: &[QueryColumn], row: &Row) -> Result<()> {
    if row.len() != columns.len() {
        return Err(Error::SchemaLengthMismatch {
            expected: columns.len(),
            found: row.len(),
        });
    }
    Ok(())
}

/// Keep the rows satisfying `predicate`; all rows when `None`. Every row
/// must have one cell per column.
pub fn filter(
    rows: impl IntoIterator<Item = Row>,
    columns: &[QueryColumn],
    predicate: Option<&Predicate>,
) -> Result<Vec<Row>> {
    let bound = predicate.map(|p| p.bind(columns)).transpose()?;
    let mut kept = Vec::new();
    for row in rows {
        check_width(columns, &row)?;
        if bound.as_ref().map_or(true, |b| b.eval(&row)) {
            kept.push(row);
        }
    }
    Ok(kept)
}

/// Column list plus rows, rebuilt per statement
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTable {
    columns: Vec<QueryColumn>,
    rows: Vec<Row>,
}

impl QueryTable {
    /// Build a query table, checking every row has one cell per column
    pub fn new(columns: Vec<QueryColumn>, rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            check_width(&columns, row)?;
        }
        Ok(Self::from_parts(columns, rows))
    }

    fn from_parts(columns: Vec<QueryColumn>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Every row of `table`
    pub fn from_table(table: &Table) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|c| QueryColumn::new(table.name(), c.clone()))
            .collect();
        Self::from_parts(columns, table.iter().collect())
    }

    /// The rows of `table` satisfying `predicate`
    pub fn from_table_filtered(table: &Table, predicate: Option<&Predicate>) -> Result<Self> {
        Self::from_table(table).filter(predicate)
    }

    pub fn columns(&self) -> &[QueryColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Qualified names of all columns
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.qualified_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by qualified or bare name
    pub fn column_index(&self, name: &str) -> Result<usize> {
        resolve_column(&self.columns, name)
    }

    /// Keep the rows satisfying `predicate`
    pub fn filter(self, predicate: Option<&Predicate>) -> Result<Self> {
        let rows = filter(self.rows, &self.columns, predicate)?;
        Ok(Self::from_parts(self.columns, rows))
    }

    /// Cartesian product of `left` and `right`, filtered by `on` when given
    pub fn join_cross(
        left: &QueryTable,
        right: &QueryTable,
        on: Option<&Predicate>,
    ) -> Result<Self> {
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());

        let bound = on.map(|p| p.bind(&columns)).transpose()?;
        let mut rows = Vec::new();
        for l_row in &left.rows {
            for r_row in &right.rows {
                let joined = l_row.concat(r_row);
                if bound.as_ref().map_or(true, |b| b.eval(&joined)) {
                    rows.push(joined);
                }
            }
        }

        debug!(
            left = left.len(),
            right = right.len(),
            output = rows.len(),
            "cross join"
        );
        Ok(Self::from_parts(columns, rows))
    }

    /// Join on every pair of columns sharing a bare name. Shared columns
    /// appear once, from the left side. With no shared names this is the
    /// full Cartesian product.
    pub fn join_natural(left: &QueryTable, right: &QueryTable) -> Result<Self> {
        let shared: Vec<(usize, usize)> = left
            .columns
            .iter()
            .enumerate()
            .filter_map(|(li, lc)| {
                right
                    .columns
                    .iter()
                    .position(|rc| rc.name() == lc.name())
                    .map(|ri| (li, ri))
            })
            .collect();

        if shared.is_empty() {
            return Self::join_cross(left, right, None);
        }

        let keep_right: Vec<usize> = (0..right.columns.len())
            .filter(|ri| !shared.iter().any(|(_, s)| s == ri))
            .collect();

        let mut columns = left.columns.clone();
        columns.extend(keep_right.iter().map(|&ri| right.columns[ri].clone()));

        let mut rows = Vec::new();
        for l_row in &left.rows {
            for r_row in &right.rows {
                let (l_cells, r_cells) = (l_row.cells(), r_row.cells());
                if shared.iter().all(|&(li, ri)| l_cells[li] == r_cells[ri]) {
                    let mut cells = l_cells.to_vec();
                    cells.extend(keep_right.iter().map(|&ri| r_cells[ri].clone()));
                    rows.push(Row::new(cells));
                }
            }
        }

        debug!(
            left = left.len(),
            right = right.len(),
            keys = shared.len(),
            output = rows.len(),
            "natural join"
        );
        Ok(Self::from_parts(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;
    use crate::executor::{Comparator, Condition};
    use crate::storage::Cell;

    fn people() -> QueryTable {
        let columns = vec![
            QueryColumn::new("p", Column::new("id", ColumnType::Int).primary(true)),
            QueryColumn::new("p", Column::string("name", 16)),
            QueryColumn::new("p", Column::new("age", ColumnType::Int)),
        ];
        let rows = vec![
            Row::new(vec![Cell::Int(1), Cell::from("ann"), Cell::Int(17)]),
            Row::new(vec![Cell::Int(2), Cell::from("bob"), Cell::Int(30)]),
            Row::new(vec![Cell::Int(3), Cell::from("cat"), Cell::Null]),
        ];
        QueryTable::new(columns, rows).unwrap()
    }

    fn ids(table: &QueryTable) -> Vec<Cell> {
        table.rows().iter().map(|r| r.cells()[0].clone()).collect()
    }

    #[test]
    fn test_resolve_column() {
        let table = people();
        assert_eq!(table.column_index("name").unwrap(), 1);
        assert_eq!(table.column_index("P.AGE").unwrap(), 2);
        assert!(matches!(
            table.column_index("q.age"),
            Err(Error::ColumnNotFound(_))
        ));

        let doubled = QueryTable::join_cross(&people(), &people(), None).unwrap();
        assert!(matches!(
            doubled.column_index("id"),
            Err(Error::AmbiguousColumn(_))
        ));
    }

    #[test]
    fn test_rows_must_match_columns() {
        let columns = vec![QueryColumn::new("p", Column::new("id", ColumnType::Int))];
        let wide = vec![Row::new(vec![Cell::Int(1), Cell::Int(2)])];

        assert!(matches!(
            QueryTable::new(columns.clone(), wide.clone()),
            Err(Error::SchemaLengthMismatch {
                expected: 1,
                found: 2
            })
        ));

        let predicate = Condition::literal("id", Comparator::Eq, "1").into();
        assert!(matches!(
            filter(wide, &columns, Some(&predicate)),
            Err(Error::SchemaLengthMismatch { .. })
        ));
        assert!(matches!(
            filter(vec![Row::new(vec![])], &columns, None),
            Err(Error::SchemaLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_filter_without_condition() {
        let table = people().filter(None).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_filter_comparators() {
        let cases = [
            (Comparator::Eq, "30", vec![Cell::Int(2)]),
            (Comparator::Ne, "30", vec![Cell::Int(1), Cell::Int(3)]),
            (Comparator::Lt, "30", vec![Cell::Int(1), Cell::Int(3)]),
            (Comparator::Le, "17", vec![Cell::Int(1), Cell::Int(3)]),
            (Comparator::Gt, "17", vec![Cell::Int(2)]),
            (Comparator::Ge, "17", vec![Cell::Int(1), Cell::Int(2)]),
        ];
        for (comparator, literal, expected) in cases {
            let predicate = Condition::literal("age", comparator, literal).into();
            let result = people().filter(Some(&predicate)).unwrap();
            assert_eq!(ids(&result), expected, "age {} {}", comparator, literal);
        }
    }

    #[test]
    fn test_filter_and_or() {
        let adult: Predicate = Condition::literal("age", Comparator::Ge, "18").into();
        let named_ann: Predicate = Condition::literal("name", Comparator::Eq, "'ann'").into();

        let either = adult.clone().or(named_ann.clone());
        let result = people().filter(Some(&either)).unwrap();
        assert_eq!(ids(&result), vec![Cell::Int(1), Cell::Int(2)]);

        let both = adult.and(named_ann);
        let result = people().filter(Some(&both)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_filter_errors() {
        let predicate = Condition::literal("email", Comparator::Eq, "'x'").into();
        assert!(matches!(
            people().filter(Some(&predicate)),
            Err(Error::ColumnNotFound(_))
        ));

        let predicate = Condition::literal("age", Comparator::Eq, "'old'").into();
        assert!(matches!(
            people().filter(Some(&predicate)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_cross_join_with_condition() {
        let left = people();
        let right = QueryTable::new(
            vec![QueryColumn::new("o", Column::new("owner", ColumnType::Int).primary(true))],
            vec![Row::new(vec![Cell::Int(2)]), Row::new(vec![Cell::Int(3)])],
        )
        .unwrap();

        let all = QueryTable::join_cross(&left, &right, None).unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(
            all.column_names(),
            vec!["p.id", "p.name", "p.age", "o.owner"]
        );

        let on = Condition::columns("p.id", Comparator::Eq, "o.owner").into();
        let matched = QueryTable::join_cross(&left, &right, Some(&on)).unwrap();
        assert_eq!(ids(&matched), vec![Cell::Int(2), Cell::Int(3)]);
    }

    #[test]
    fn test_natural_join_emits_shared_once() {
        let left = people();
        let right = QueryTable::new(
            vec![
                QueryColumn::new("s", Column::new("id", ColumnType::Int).primary(true)),
                QueryColumn::new("s", Column::new("score", ColumnType::Double)),
            ],
            vec![
                Row::new(vec![Cell::Int(3), Cell::Double(9.5)]),
                Row::new(vec![Cell::Int(1), Cell::Double(7.0)]),
                Row::new(vec![Cell::Int(8), Cell::Double(1.0)]),
            ],
        )
        .unwrap();

        let joined = QueryTable::join_natural(&left, &right).unwrap();
        assert_eq!(
            joined.column_names(),
            vec!["p.id", "p.name", "p.age", "s.score"]
        );
        assert_eq!(
            joined.rows(),
            &[
                Row::new(vec![
                    Cell::Int(1),
                    Cell::from("ann"),
                    Cell::Int(17),
                    Cell::Double(7.0)
                ]),
                Row::new(vec![
                    Cell::Int(3),
                    Cell::from("cat"),
                    Cell::Null,
                    Cell::Double(9.5)
                ]),
            ]
        );
    }

    #[test]
    fn test_natural_join_without_shared_columns() {
        let right = QueryTable::new(
            vec![QueryColumn::new("c", Column::string("color", 8).primary(true))],
            vec![
                Row::new(vec![Cell::from("red")]),
                Row::new(vec![Cell::from("blue")]),
            ],
        )
        .unwrap();
        let joined = QueryTable::join_natural(&people(), &right).unwrap();
        assert_eq!(joined.len(), 6);
        assert_eq!(joined.columns().len(), 4);
    }
}
