//! Write-Ahead Log (WAL)
//!
//! Each database keeps one append-only text log. Every successful mutating
//! statement is written as one line, `"<session>|<statement>"`. Backslash,
//! newline and carriage return inside a statement are written as `\\`,
//! `\n` and `\r`. The literal statements `begin transaction` and `commit`
//! mark transaction boundaries.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::catalog::SessionId;
use crate::error::{Error, Result};

/// Statement text opening a transaction
pub const BEGIN_TRANSACTION: &str = "begin transaction";
/// Statement text committing a transaction
pub const COMMIT: &str = "commit";

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Session that issued the statement
    pub session: SessionId,
    /// Statement text
    pub statement: String,
}

impl LogEntry {
    pub fn new(session: SessionId, statement: impl Into<String>) -> Self {
        Self {
            session,
            statement: statement.into(),
        }
    }

    /// Is this a `begin transaction` or `commit` marker?
    pub fn is_marker(&self) -> bool {
        self.is_commit() || self.statement == BEGIN_TRANSACTION
    }

    pub fn is_commit(&self) -> bool {
        self.statement == COMMIT
    }

    fn parse(line: &str) -> Option<Self> {
        let (session, statement) = line.split_once('|')?;
        let session = session.trim().parse().ok()?;
        Some(Self::new(session, unescape(statement)?))
    }
}

fn escape(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    for c in statement.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

/// Pick the entries crash recovery must re-execute: for each session, the
/// non-marker statements at or before that session's last `commit`.
/// Statements after a session's last commit belong to a transaction that
/// never finished and are dropped.
pub fn committed_statements(entries: &[LogEntry]) -> Vec<&LogEntry> {
    let mut last_commit: HashMap<SessionId, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        if entry.is_commit() {
            last_commit.insert(entry.session, i);
        }
    }

    entries
        .iter()
        .enumerate()
        .filter(|(i, entry)| {
            !entry.is_marker()
                && last_commit
                    .get(&entry.session)
                    .map_or(false, |&commit| *i <= commit)
        })
        .map(|(_, entry)| entry)
        .collect()
}

/// One database's log file
#[derive(Debug)]
pub struct WriteAheadLog {
    path: PathBuf,
    /// Serializes appends, reads and truncation
    file_lock: Mutex<()>,
}

impl WriteAheadLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one statement
    pub fn append(&self, session: SessionId, statement: &str) -> Result<()> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::io(&self.path, e))?;
        writeln!(file, "{}|{}", session, escape(statement))
            .map_err(|e| Error::io(&self.path, e))?;
        file.flush().map_err(|e| Error::io(&self.path, e))?;
        debug!(path = %self.path.display(), session, statement, "wal append");
        Ok(())
    }

    /// Read every entry in order. A missing log reads as empty.
    pub fn read_entries(&self) -> Result<Vec<LogEntry>> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.path, e)),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match LogEntry::parse(&line) {
                Some(entry) => entries.push(entry),
                None => warn!(
                    path = %self.path.display(),
                    line = %line,
                    "skipping malformed wal line"
                ),
            }
        }
        Ok(entries)
    }

    /// Empty the log
    pub fn truncate(&self) -> Result<()> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        File::create(&self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(())
    }
}
