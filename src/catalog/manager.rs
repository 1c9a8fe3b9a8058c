//! Database Manager
//!
//! The manager is the process-wide registry of databases. It tracks each
//! session's current database and held table locks, appends statements to
//! the current database's WAL, and on startup rebuilds every database listed
//! in the catalog file and replays its WAL.
//!
//! Per-database lifecycle:
//!
//! ```text
//! UNLOADED ─recover─▶ LOADED (WAL pending) ─replay─▶ LOADED (WAL clear)
//!     ▲                                                   │
//!     └────────────────────── quit (persist) ◀────────────┘
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use super::database::Database;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::StatementExecutor;
use crate::storage::file::replace_file;
use crate::storage::wal::{committed_statements, BEGIN_TRANSACTION, COMMIT};
use crate::storage::{LockMode, Table};

/// Identifier of a client session
pub type SessionId = u64;

/// Session used to re-execute committed statements during recovery. Its
/// statements are never written back to the WAL.
pub const REPLAY_SESSION: SessionId = u64::MAX;

/// Per-session state
#[derive(Debug, Default)]
struct SessionState {
    current_database: Option<String>,
    held_tables: Vec<Arc<Table>>,
}

/// Outcome of replaying one database's WAL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Committed statements re-executed successfully
    pub replayed: usize,
    /// Statements discarded because their transaction never committed
    pub skipped: usize,
    /// Committed statements the executor rejected
    pub failed: usize,
}

/// Database Manager
#[derive(Debug)]
pub struct Manager {
    config: Config,
    databases: RwLock<IndexMap<String, Arc<Database>>>,
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl Manager {
    /// Create a manager with no databases loaded
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| Error::io(&config.data_dir, e))?;
        Ok(Self {
            config,
            databases: RwLock::new(IndexMap::new()),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Create a manager and recover every database listed in the catalog
    pub fn open(config: Config, executor: &dyn StatementExecutor) -> Result<Self> {
        let manager = Self::new(config)?;
        manager.recover(executor)?;
        Ok(manager)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn databases(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<Database>>> {
        self.databases.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn databases_mut(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<Database>>> {
        self.databases.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the database unless it exists, listing it in the catalog file.
    /// If `session` has no current database, this one becomes current.
    pub fn create_database_if_not_exists(
        &self,
        session: SessionId,
        name: &str,
    ) -> Result<Arc<Database>> {
        let name = name.to_lowercase();
        let database = {
            let mut databases = self.databases_mut();
            match databases.get(&name) {
                Some(database) => database.clone(),
                None => {
                    let database = Arc::new(Database::open(
                        name.clone(),
                        self.config.database_dir(&name),
                    )?);
                    // The catalog must list the database before its WAL is relied on
                    if session != REPLAY_SESSION {
                        self.write_catalog(databases.keys().chain(std::iter::once(&name)))?;
                    }
                    databases.insert(name.clone(), database.clone());
                    info!(database = %name, "database created");
                    database
                }
            }
        };

        let mut sessions = self.sessions();
        let state = sessions.entry(session).or_default();
        if state.current_database.is_none() {
            state.current_database = Some(name);
        }
        Ok(database)
    }

    /// Make `name` the current database of `session`
    pub fn switch_database(&self, session: SessionId, name: &str) -> Result<()> {
        let name = name.to_lowercase();
        if !self.databases().contains_key(&name) {
            return Err(Error::DatabaseNotFound(name));
        }
        self.sessions().entry(session).or_default().current_database = Some(name);
        Ok(())
    }

    /// Get a database by name
    pub fn get_database(&self, name: &str) -> Result<Arc<Database>> {
        let name = name.to_lowercase();
        self.databases()
            .get(&name)
            .cloned()
            .ok_or(Error::DatabaseNotFound(name))
    }

    /// The current database of `session`
    pub fn current_database(&self, session: SessionId) -> Result<Arc<Database>> {
        let name = self
            .sessions()
            .get(&session)
            .and_then(|s| s.current_database.clone())
            .ok_or(Error::NoDatabaseSelected(session))?;
        self.get_database(&name)
    }

    /// Drop a database with all its tables. Sessions using it lose their
    /// current database. The catalog file is rewritten first; if that fails
    /// nothing changes.
    pub fn delete_database(&self, name: &str) -> Result<()> {
        let name = name.to_lowercase();
        let database = {
            let mut databases = self.databases_mut();
            if !databases.contains_key(&name) {
                return Err(Error::DatabaseNotFound(name));
            }
            self.write_catalog(databases.keys().filter(|n| **n != name))?;
            databases.shift_remove(&name)
        };

        for state in self.sessions().values_mut() {
            if state.current_database.as_deref() == Some(name.as_str()) {
                state.current_database = None;
            }
        }
        match database {
            Some(database) => database.drop_database(),
            None => Ok(()),
        }
    }

    /// List database names
    pub fn database_names(&self) -> Vec<String> {
        self.databases().keys().cloned().collect()
    }

    /// Rewrite the catalog file, one database name per line
    pub fn persist(&self) -> Result<()> {
        let databases = self.databases_mut();
        self.write_catalog(databases.keys())
    }

    // Callers hold the database map write guard so the file matches the map
    fn write_catalog<'a>(&self, names: impl Iterator<Item = &'a String>) -> Result<()> {
        let path = self.config.catalog_path();
        replace_file(&path, |w| {
            for name in names {
                writeln!(w, "{}", name)?;
            }
            Ok(())
        })
    }

    /// Snapshot one database and rewrite the catalog file
    pub fn persist_database(&self, name: &str) -> Result<()> {
        self.get_database(name)?.persist()?;
        self.persist()
    }

    /// Append `statement` to the WAL of `session`'s current database
    pub fn write_log(&self, statement: &str, session: SessionId) -> Result<()> {
        if session == REPLAY_SESSION {
            return Ok(());
        }
        self.current_database(session)?
            .wal()
            .append(session, statement)
    }

    /// Take a shared lock on `table` for `session` and remember it
    pub fn lock_shared(&self, session: SessionId, table: &Arc<Table>) -> Result<()> {
        self.lock_table(session, table, LockMode::Shared)
    }

    /// Take an exclusive lock on `table` for `session` and remember it
    pub fn lock_exclusive(&self, session: SessionId, table: &Arc<Table>) -> Result<()> {
        self.lock_table(session, table, LockMode::Exclusive)
    }

    fn lock_table(&self, session: SessionId, table: &Arc<Table>, mode: LockMode) -> Result<()> {
        // Wait without holding the session registry
        table.acquire(session, mode, self.config.lock_timeout_duration())?;

        let mut sessions = self.sessions();
        let held = &mut sessions.entry(session).or_default().held_tables;
        if !held.iter().any(|t| Arc::ptr_eq(t, table)) {
            held.push(table.clone());
        }
        Ok(())
    }

    /// Release every table lock held by `session`
    pub fn release_session_locks(&self, session: SessionId) {
        let held = match self.sessions().get_mut(&session) {
            Some(state) => std::mem::take(&mut state.held_tables),
            None => return,
        };
        debug!(session, tables = held.len(), "releasing session locks");
        for table in held {
            table.release_all(session);
        }
    }

    /// Names of the tables `session` currently holds locks on
    pub fn held_tables(&self, session: SessionId) -> Vec<String> {
        self.sessions()
            .get(&session)
            .map(|s| s.held_tables.iter().map(|t| t.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Forget a session, releasing its locks
    pub fn close_session(&self, session: SessionId) {
        self.release_session_locks(session);
        self.sessions().remove(&session);
    }

    /// Rebuild every database listed in the catalog file and replay its WAL
    pub fn recover(&self, executor: &dyn StatementExecutor) -> Result<()> {
        let path = self.config.catalog_path();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no catalog file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(Error::io(&path, e)),
        };

        let mut names = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(&path, e))?;
            let name = line.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }

        for name in &names {
            self.create_database_if_not_exists(REPLAY_SESSION, name)?;
            let summary = self.replay_log(name, executor)?;
            info!(
                database = %name,
                replayed = summary.replayed,
                skipped = summary.skipped,
                failed = summary.failed,
                "database recovered"
            );
        }
        self.close_session(REPLAY_SESSION);
        Ok(())
    }

    /// Re-execute the committed statements in `name`'s WAL, snapshot the
    /// database, then empty the WAL.
    pub fn replay_log(
        &self,
        name: &str,
        executor: &dyn StatementExecutor,
    ) -> Result<ReplaySummary> {
        let database = self.get_database(name)?;
        let entries = database.wal().read_entries()?;
        let committed = committed_statements(&entries);
        let markers = entries.iter().filter(|e| e.is_marker()).count();

        let mut summary = ReplaySummary {
            skipped: entries.len() - markers - committed.len(),
            ..Default::default()
        };

        if !committed.is_empty() {
            self.switch_database(REPLAY_SESSION, database.name())?;
            for entry in committed {
                debug!(
                    database = %name,
                    session = entry.session,
                    statement = %entry.statement,
                    "replaying"
                );
                match self.replay_statement(&entry.statement, executor) {
                    Ok(()) => summary.replayed += 1,
                    Err(e) => {
                        warn!(
                            database = %name,
                            statement = %entry.statement,
                            error = %e,
                            "replayed statement failed"
                        );
                        summary.failed += 1;
                    }
                }
                self.release_session_locks(REPLAY_SESSION);
            }
        }

        // Snapshot first: until it lands, the WAL is the only copy
        self.persist_database(database.name())?;
        database.wal().truncate()?;
        Ok(summary)
    }

    fn replay_statement(
        &self,
        statement: &str,
        executor: &dyn StatementExecutor,
    ) -> anyhow::Result<()> {
        executor.evaluate(self, BEGIN_TRANSACTION, REPLAY_SESSION)?;
        executor.evaluate(self, statement, REPLAY_SESSION)?;
        executor.evaluate(self, COMMIT, REPLAY_SESSION)
    }

    /// Persist every database and the catalog, then unload everything.
    /// Holds the catalog write lock for the whole shutdown.
    pub fn quit(&self) -> Result<()> {
        let mut databases = self.databases_mut();
        for database in databases.values() {
            database.persist()?;
        }
        self.write_catalog(databases.keys())?;
        let count = databases.len();
        databases.clear();
        drop(databases);

        let sessions: Vec<SessionId> = self.sessions().keys().copied().collect();
        for session in sessions {
            self.close_session(session);
        }
        info!(databases = count, "manager shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ColumnType};
    use std::time::Duration;

    struct NoopExecutor;

    impl StatementExecutor for NoopExecutor {
        fn evaluate(
            &self,
            _manager: &Manager,
            _statement: &str,
            _session: SessionId,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_manager(dir: &tempfile::TempDir) -> Manager {
        let config = Config::new()
            .data_dir(dir.path())
            .lock_timeout(Duration::from_millis(50));
        Manager::new(config).unwrap()
    }

    #[test]
    fn test_create_database_selects_first() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);

        manager.create_database_if_not_exists(1, "A").unwrap();
        manager.create_database_if_not_exists(1, "b").unwrap();
        assert_eq!(manager.current_database(1).unwrap().name(), "a");
        assert_eq!(manager.database_names(), vec!["a", "b"]);
        let catalog = std::fs::read_to_string(dir.path().join("manager")).unwrap();
        assert_eq!(catalog, "a\nb\n");

        // idempotent
        manager.create_database_if_not_exists(1, "a").unwrap();
        assert_eq!(manager.database_names().len(), 2);
    }

    #[test]
    fn test_database_named_like_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);

        manager.create_database_if_not_exists(1, "manager").unwrap();
        manager.create_database_if_not_exists(1, "other").unwrap();
        assert_eq!(manager.database_names(), vec!["manager", "other"]);

        let catalog = std::fs::read_to_string(dir.path().join("manager")).unwrap();
        assert_eq!(catalog, "manager\nother\n");
        assert!(dir.path().join("databases").join("manager").is_dir());
    }

    #[test]
    fn test_failed_catalog_write_leaves_catalog_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);
        manager.create_database_if_not_exists(1, "a").unwrap();

        let blocker = dir.path().join("manager.tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(matches!(
            manager.create_database_if_not_exists(1, "b"),
            Err(Error::StorageIo { .. })
        ));
        assert!(matches!(
            manager.delete_database("a"),
            Err(Error::StorageIo { .. })
        ));
        assert_eq!(manager.database_names(), vec!["a"]);
        assert!(manager.get_database("a").unwrap().dir().exists());

        std::fs::remove_dir(&blocker).unwrap();
        manager.create_database_if_not_exists(1, "b").unwrap();
        let catalog = std::fs::read_to_string(dir.path().join("manager")).unwrap();
        assert_eq!(catalog, "a\nb\n");
    }

    #[test]
    fn test_current_database_is_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);
        manager.create_database_if_not_exists(1, "a").unwrap();
        manager.create_database_if_not_exists(1, "b").unwrap();

        assert!(matches!(
            manager.current_database(2),
            Err(Error::NoDatabaseSelected(2))
        ));

        manager.switch_database(2, "b").unwrap();
        assert_eq!(manager.current_database(1).unwrap().name(), "a");
        assert_eq!(manager.current_database(2).unwrap().name(), "b");

        assert!(matches!(
            manager.switch_database(2, "missing"),
            Err(Error::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_delete_database() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);
        manager.create_database_if_not_exists(1, "a").unwrap();

        manager.delete_database("a").unwrap();
        assert!(manager.database_names().is_empty());
        assert!(matches!(
            manager.current_database(1),
            Err(Error::NoDatabaseSelected(1))
        ));
        assert!(matches!(
            manager.delete_database("a"),
            Err(Error::DatabaseNotFound(_))
        ));
    }

    #[test]
    fn test_persist_writes_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);
        manager.create_database_if_not_exists(1, "a").unwrap();
        manager.create_database_if_not_exists(1, "b").unwrap();
        manager.persist().unwrap();

        let catalog = std::fs::read_to_string(dir.path().join("manager")).unwrap();
        assert_eq!(catalog, "a\nb\n");
    }

    #[test]
    fn test_write_log() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);

        assert!(matches!(
            manager.write_log("commit", 4),
            Err(Error::NoDatabaseSelected(4))
        ));

        let db = manager.create_database_if_not_exists(4, "a").unwrap();
        manager.write_log("begin transaction", 4).unwrap();
        manager.write_log("drop table t", 4).unwrap();
        manager.write_log("commit", 4).unwrap();
        manager.write_log("ignored", REPLAY_SESSION).unwrap();

        let contents = std::fs::read_to_string(db.wal().path()).unwrap();
        assert_eq!(contents, "4|begin transaction\n4|drop table t\n4|commit\n");
    }

    #[test]
    fn test_session_lock_registry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(&dir);
        let db = manager.create_database_if_not_exists(1, "a").unwrap();
        let t1 = db
            .create_table("t1", vec![Column::new("id", ColumnType::Int).primary(true)])
            .unwrap();
        let t2 = db
            .create_table("t2", vec![Column::new("id", ColumnType::Int).primary(true)])
            .unwrap();

        manager.lock_exclusive(1, &t1).unwrap();
        manager.lock_shared(1, &t2).unwrap();
        manager.lock_shared(1, &t2).unwrap();
        assert_eq!(manager.held_tables(1), vec!["t1", "t2"]);

        assert!(matches!(
            manager.lock_shared(2, &t1),
            Err(Error::LockTimeout { .. })
        ));
        manager.lock_shared(2, &t2).unwrap();

        manager.release_session_locks(1);
        assert!(manager.held_tables(1).is_empty());
        assert!(!t1.holds_lock(1, LockMode::Exclusive));
        manager.lock_shared(2, &t1).unwrap();
    }

    #[test]
    fn test_quit_then_recover() {
        let dir = tempfile::tempdir().unwrap();
        {
            let manager = test_manager(&dir);
            let db = manager.create_database_if_not_exists(1, "a").unwrap();
            db.create_table("t", vec![Column::new("id", ColumnType::Int).primary(true)])
                .unwrap();
            manager.create_database_if_not_exists(1, "b").unwrap();
            manager.quit().unwrap();
            assert!(manager.database_names().is_empty());
        }

        let config = Config::new().data_dir(dir.path());
        let manager = Manager::open(config, &NoopExecutor).unwrap();
        assert_eq!(manager.database_names(), vec!["a", "b"]);
        assert!(manager.get_database("a").unwrap().table_exists("t"));
        // recovery does not leave the replay session behind
        assert!(manager.current_database(REPLAY_SESSION).is_err());
    }
}
