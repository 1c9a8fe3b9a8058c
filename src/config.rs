//! Engine configuration
//!
//! Settings are built in code with the builder methods below or loaded from
//! a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default root directory for catalog, WAL and snapshot files
pub const DEFAULT_DATA_DIR: &str = "data";

/// Subdirectory of the data directory holding one directory per database
pub const DATABASES_DIR: &str = "databases";

/// Max length of string columns declared without one
pub const DEFAULT_STRING_LENGTH: usize = 128;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for all on-disk state
    pub data_dir: PathBuf,
    /// How long a table lock request may wait, in milliseconds.
    /// `None` waits forever.
    pub lock_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            lock_timeout_ms: None,
        }
    }
}

impl Config {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the lock acquisition timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Lock timeout as a duration
    pub fn lock_timeout_duration(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Path of the catalog file listing every database
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("manager")
    }

    /// Directory holding one database's files. Databases live apart from
    /// the catalog file, so any name is usable.
    pub fn database_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(DATABASES_DIR).join(name)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Install a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Safe to call more than once.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
