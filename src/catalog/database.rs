//! Database catalog unit
//!
//! A database owns its tables (by name), its WAL and a metadata file that
//! records every table's schema so the tables can be rebuilt at startup.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::schema::Column;
use crate::error::{Error, Result};
use crate::storage::file::replace_file;
use crate::storage::{Table, WriteAheadLog};

const META_FILE: &str = "meta.json";
const LOG_FILE: &str = "log";
const TABLES_DIR: &str = "tables";

/// Serializable schema of one table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    name: String,
    columns: Vec<Column>,
}

/// A named collection of tables with its own WAL
#[derive(Debug)]
pub struct Database {
    name: String,
    dir: PathBuf,
    tables: RwLock<IndexMap<String, Arc<Table>>>,
    wal: WriteAheadLog,
}

impl Database {
    /// Open the database stored under `dir`, rebuilding every table listed
    /// in its metadata file. A missing directory yields an empty database.
    pub fn open(name: impl Into<String>, dir: impl Into<PathBuf>) -> Result<Self> {
        let name = name.into();
        let dir = dir.into();
        std::fs::create_dir_all(dir.join(TABLES_DIR))
            .map_err(|e| Error::io(dir.join(TABLES_DIR), e))?;

        let database = Self {
            wal: WriteAheadLog::new(dir.join(LOG_FILE)),
            name,
            dir,
            tables: RwLock::new(IndexMap::new()),
        };

        let metas = database.read_meta()?;
        {
            let mut tables = database.tables_mut();
            for meta in metas {
                let table = database.new_table(&meta.name, meta.columns)?;
                tables.insert(meta.name, Arc::new(table));
            }
            info!(database = %database.name, tables = tables.len(), "database opened");
        }
        Ok(database)
    }

    fn tables(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<Table>>> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tables_mut(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<Table>>> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_table(&self, name: &str, columns: Vec<Column>) -> Result<Table> {
        let path = self.dir.join(TABLES_DIR).join(name);
        Table::create(&self.name, name, columns, path)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    fn read_meta(&self) -> Result<Vec<TableMeta>> {
        let path = self.meta_path();
        match std::fs::read_to_string(&path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    // Callers hold the table map write guard so the file matches the map
    fn write_meta<'a>(&self, tables: impl Iterator<Item = &'a Arc<Table>>) -> Result<()> {
        let metas: Vec<TableMeta> = tables
            .map(|t| TableMeta {
                name: t.name().to_string(),
                columns: t.columns().to_vec(),
            })
            .collect();
        replace_file(&self.meta_path(), |w| {
            serde_json::to_writer_pretty(&mut *w, &metas).map_err(std::io::Error::from)
        })
    }

    /// Get the database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this database's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The database's write-ahead log
    pub fn wal(&self) -> &WriteAheadLog {
        &self.wal
    }

    /// Create a new table. Rows from an earlier snapshot of a table with the
    /// same name are reloaded.
    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<Arc<Table>> {
        let name = name.to_lowercase();
        let mut tables = self.tables_mut();
        if tables.contains_key(&name) {
            return Err(Error::TableAlreadyExists(name));
        }
        let table = Arc::new(self.new_table(&name, columns)?);
        self.write_meta(tables.values().chain(std::iter::once(&table)))?;
        tables.insert(name.clone(), table.clone());
        info!(database = %self.name, table = %name, "table created");
        Ok(table)
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        let name = name.to_lowercase();
        self.tables()
            .get(&name)
            .cloned()
            .ok_or(Error::TableNotFound(name))
    }

    /// Check if a table exists
    pub fn table_exists(&self, name: &str) -> bool {
        self.tables().contains_key(&name.to_lowercase())
    }

    /// Drop a table and delete its snapshot
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let name = name.to_lowercase();
        let mut tables = self.tables_mut();
        if !tables.contains_key(&name) {
            return Err(Error::TableNotFound(name));
        }
        self.write_meta(tables.values().filter(|t| t.name() != name))?;
        match tables.shift_remove(&name) {
            Some(table) => table.drop_table(),
            None => Ok(()),
        }
    }

    /// List table names in creation order
    pub fn table_names(&self) -> Vec<String> {
        self.tables().keys().cloned().collect()
    }

    /// Snapshot every table and rewrite the metadata file
    pub fn persist(&self) -> Result<()> {
        let tables = self.tables_mut();
        for table in tables.values() {
            table.persist()?;
        }
        self.write_meta(tables.values())?;
        info!(database = %self.name, tables = tables.len(), "database persisted");
        Ok(())
    }

    /// Drop every table and delete the database directory
    pub fn drop_database(&self) -> Result<()> {
        let tables: Vec<Arc<Table>> = self.tables_mut().drain(..).map(|(_, t)| t).collect();
        for table in tables {
            table.drop_table()?;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.dir, e)),
        }
        info!(database = %self.name, "database dropped");
        Ok(())
    }
}
