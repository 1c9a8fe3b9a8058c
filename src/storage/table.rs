//! Table storage for CellarDB
//!
//! A table owns an ordered primary-key index (`Cell` → `Row`) that is the
//! only copy of its row data, validates every row against the schema, and
//! snapshots the whole index to one file on `persist`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info};

use super::file::replace_file;
use super::lock::{LockMode, TableLock};
use super::row::{read_snapshot, write_snapshot, Cell, Row};
use crate::catalog::{Column, ColumnType, SessionId};
use crate::error::{Error, Result};

/// A table combining schema, primary-key index and session lock
#[derive(Debug)]
pub struct Table {
    database: String,
    name: String,
    columns: Vec<Column>,
    primary_index: usize,
    index: RwLock<BTreeMap<Cell, Row>>,
    lock: TableLock,
    snapshot_path: PathBuf,
    dropped: AtomicBool,
}

impl Table {
    /// Create a table, reloading rows from `snapshot_path` if a snapshot
    /// already exists there.
    pub fn create(
        database: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<Column>,
        snapshot_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let name = name.into().to_lowercase();
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|mut c| {
                c.name = c.name.to_lowercase();
                c
            })
            .collect();

        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::DuplicateColumnName(column.name.clone()));
            }
        }

        let mut primaries = columns.iter().enumerate().filter(|(_, c)| c.primary);
        let primary_index = match (primaries.next(), primaries.next()) {
            (Some((i, _)), None) => i,
            _ => return Err(Error::MultiplePrimaryKey(name)),
        };

        let table = Self {
            database: database.into(),
            lock: TableLock::new(name.clone()),
            name,
            columns,
            primary_index,
            index: RwLock::new(BTreeMap::new()),
            snapshot_path: snapshot_path.into(),
            dropped: AtomicBool::new(false),
        };
        table.recover()?;
        Ok(table)
    }

    fn recover(&self) -> Result<()> {
        let rows = self.deserialize()?;
        if rows.is_empty() {
            return Ok(());
        }
        let mut index = self.index_mut();
        for row in rows {
            self.check_row_valid(&row)?;
            index.insert(self.key_of(&row).clone(), row);
        }
        info!(table = %self.name, rows = index.len(), "table recovered from snapshot");
        Ok(())
    }

    fn index(&self) -> RwLockReadGuard<'_, BTreeMap<Cell, Row>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<Cell, Row>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(Error::TableNotFound(self.name.clone()));
        }
        Ok(())
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning database
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Position of the primary-key column
    pub fn primary_index(&self) -> usize {
        self.primary_index
    }

    /// Get column index by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.columns.iter().position(|c| c.name == name)
    }

    /// Path of the snapshot file
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.index().len()
    }

    /// Check if table holds no rows
    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    fn key_of<'a>(&self, row: &'a Row) -> &'a Cell {
        &row.cells()[self.primary_index]
    }

    /// Look up a row by primary key
    pub fn get(&self, key: &Cell) -> Result<Option<Row>> {
        self.ensure_live()?;
        Ok(self.index().get(key).cloned())
    }

    /// Insert a row
    pub fn insert(&self, row: Row) -> Result<()> {
        self.ensure_live()?;
        self.check_row_valid(&row)?;
        let mut index = self.index_mut();
        let key = self.key_of(&row);
        if index.contains_key(key) {
            return Err(Error::DuplicateKey);
        }
        index.insert(key.clone(), row);
        Ok(())
    }

    /// Delete the row whose primary key matches `row`'s
    pub fn delete(&self, row: &Row) -> Result<()> {
        self.ensure_live()?;
        self.check_row_valid(row)?;
        let mut index = self.index_mut();
        index.remove(self.key_of(row)).ok_or(Error::KeyNotFound)?;
        Ok(())
    }

    /// Replace the row stored under `old_key` with `new_row`. Changing the
    /// key onto another existing row is rejected and leaves the table as it
    /// was.
    pub fn update(&self, old_key: &Cell, new_row: Row) -> Result<()> {
        self.ensure_live()?;
        self.check_row_valid(&new_row)?;
        let mut index = self.index_mut();
        if !index.contains_key(old_key) {
            return Err(Error::KeyNotFound);
        }
        let new_key = self.key_of(&new_row);
        if new_key != old_key && index.contains_key(new_key) {
            return Err(Error::DuplicateKey);
        }
        index.remove(old_key);
        index.insert(new_key.clone(), new_row);
        Ok(())
    }

    /// Rows in ascending primary-key order, as of this call. Later writes
    /// are not visible to the returned iterator; call again to restart.
    pub fn iter(&self) -> std::vec::IntoIter<Row> {
        let rows: Vec<Row> = self.index().values().cloned().collect();
        rows.into_iter()
    }

    /// Build a full row from an insert's column list and literal values.
    /// With no column names, values map to columns by position. Columns not
    /// named are filled with NULL.
    pub fn build_row(&self, column_names: &[&str], literals: &[&str]) -> Result<Row> {
        if column_names.is_empty() {
            if literals.len() != self.columns.len() {
                return Err(Error::SchemaLengthMismatch {
                    expected: self.columns.len(),
                    found: literals.len(),
                });
            }
            return self
                .columns
                .iter()
                .zip(literals)
                .map(|(column, literal)| column.parse_literal(literal))
                .collect();
        }

        let names: Vec<String> = column_names.iter().map(|n| n.to_lowercase()).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::DuplicateColumnName(name.clone()));
            }
        }
        if literals.len() != names.len() {
            return Err(Error::SchemaLengthMismatch {
                expected: names.len(),
                found: literals.len(),
            });
        }
        if let Some(unknown) = names.iter().find(|n| self.column_index(n).is_none()) {
            return Err(Error::ColumnNotFound(unknown.clone()));
        }

        self.columns
            .iter()
            .map(|column| match names.iter().position(|n| *n == column.name) {
                Some(i) => column.parse_literal(literals[i]),
                None if column.primary => Err(Error::NullValue(column.name.clone())),
                None => Ok(Cell::Null),
            })
            .collect()
    }

    fn check_row_valid(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::SchemaLengthMismatch {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        for (cell, column) in row.cells().iter().zip(&self.columns) {
            let Some(kind) = cell.kind() else {
                if column.not_null {
                    return Err(Error::NullValue(column.name.clone()));
                }
                continue;
            };
            if kind != column.column_type {
                return Err(Error::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.column_type.to_string(),
                    found: cell.type_name().to_string(),
                });
            }
            if let (ColumnType::String, Some(s)) = (kind, cell.as_str()) {
                let length = s.chars().count();
                if length > column.max_length {
                    return Err(Error::ValueTooLong {
                        column: column.name.clone(),
                        length,
                        max: column.max_length,
                    });
                }
            }
        }
        Ok(())
    }

    /// Write every row to the snapshot file, replacing its previous content
    pub fn persist(&self) -> Result<()> {
        self.ensure_live()?;
        let index = self.index();
        replace_file(&self.snapshot_path, |w| write_snapshot(w, index.values()))?;
        debug!(table = %self.name, rows = index.len(), "table persisted");
        Ok(())
    }

    fn deserialize(&self) -> Result<Vec<Row>> {
        let path = &self.snapshot_path;
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(path, e)),
        };
        read_snapshot(&mut BufReader::new(file)).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof => {
                Error::CorruptSnapshot {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            }
            _ => Error::io(path, e),
        })
    }

    /// Remove the snapshot file. The table is unusable afterwards.
    pub fn drop_table(&self) -> Result<()> {
        self.dropped.store(true, Ordering::Release);
        self.index_mut().clear();
        match std::fs::remove_file(&self.snapshot_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.snapshot_path, e)),
        }
        info!(database = %self.database, table = %self.name, "table dropped");
        Ok(())
    }

    /// Acquire this table's lock for `session`
    pub fn acquire(
        &self,
        session: SessionId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.lock.acquire(session, mode, timeout)
    }

    /// Take a shared lock, waiting until no other session holds exclusive
    pub fn acquire_shared(&self, session: SessionId, timeout: Option<Duration>) -> Result<()> {
        self.lock.acquire_shared(session, timeout)
    }

    /// Take an exclusive lock, waiting until no other session holds any
    pub fn acquire_exclusive(&self, session: SessionId, timeout: Option<Duration>) -> Result<()> {
        self.lock.acquire_exclusive(session, timeout)
    }

    pub fn release_shared(&self, session: SessionId) {
        self.lock.release_shared(session);
    }

    pub fn release_exclusive(&self, session: SessionId) {
        self.lock.release_exclusive(session);
    }

    /// Release both modes for `session`
    pub fn release_all(&self, session: SessionId) {
        self.lock.release_all(session);
    }

    /// Check whether `session` holds this table's lock in `mode`
    pub fn holds_lock(&self, session: SessionId, mode: LockMode) -> bool {
        self.lock.holds(session, mode)
    }

    /// Human-readable schema listing
    pub fn describe(&self) -> String {
        let mut info = format!("[{}]\n", self.name);
        for column in &self.columns {
            info.push_str(&format!("  {}\n", column));
        }
        info
    }
}
