//! Session-scoped table locks
//!
//! Every table carries one [`TableLock`]. Sessions take it in shared (S) or
//! exclusive (X) mode; both modes are reentrant per session. Waiters block
//! on a condition variable and are woken whenever a holder releases.
//!
//! # Compatibility
//!
//! ```text
//!          │ S  │ X  │
//! ─────────┼────┼────┤
//!     S    │ ✓  │ ✗  │
//!     X    │ ✗  │ ✗  │
//! ```
//!
//! A session holding X already satisfies S. A session that is the only S
//! holder may upgrade to X. Granting is not fair: a steady stream of shared
//! requests can starve an exclusive waiter, and nothing detects deadlock
//! between tables, so multi-table statements must lock tables in one
//! global order.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::catalog::SessionId;
use crate::error::{Error, Result};

/// Lock Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Default)]
struct LockState {
    shared: HashSet<SessionId>,
    exclusive: Option<SessionId>,
}

impl LockState {
    fn can_share(&self, session: SessionId) -> bool {
        self.exclusive.map_or(true, |holder| holder == session)
    }

    fn can_exclude(&self, session: SessionId) -> bool {
        match self.exclusive {
            Some(holder) => holder == session,
            None => self.shared.iter().all(|&s| s == session),
        }
    }
}

/// Shared/exclusive lock owned by a single table
#[derive(Debug)]
pub struct TableLock {
    table: String,
    state: Mutex<LockState>,
    released: Condvar,
}

impl TableLock {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the lock in `mode`, waiting at most `timeout` (forever when
    /// `None`).
    pub fn acquire(
        &self,
        session: SessionId,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state();

        loop {
            let granted = match mode {
                LockMode::Shared => state.can_share(session),
                LockMode::Exclusive => state.can_exclude(session),
            };
            if granted {
                break;
            }

            state = match deadline {
                None => self
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(table = %self.table, session, ?mode, "lock wait timed out");
                        return Err(Error::LockTimeout {
                            table: self.table.clone(),
                            session,
                        });
                    }
                    self.released
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        match mode {
            // an X holder keeps its single X entry; S is implied
            LockMode::Shared => {
                if state.exclusive != Some(session) {
                    state.shared.insert(session);
                }
            }
            LockMode::Exclusive => {
                state.shared.remove(&session);
                state.exclusive = Some(session);
            }
        }
        debug!(table = %self.table, session, ?mode, "lock granted");
        Ok(())
    }

    /// Acquire a shared lock
    pub fn acquire_shared(&self, session: SessionId, timeout: Option<Duration>) -> Result<()> {
        self.acquire(session, LockMode::Shared, timeout)
    }

    /// Acquire an exclusive lock
    pub fn acquire_exclusive(&self, session: SessionId, timeout: Option<Duration>) -> Result<()> {
        self.acquire(session, LockMode::Exclusive, timeout)
    }

    /// Release a shared lock. No-op when not held.
    pub fn release_shared(&self, session: SessionId) {
        let mut state = self.state();
        if state.shared.remove(&session) {
            drop(state);
            self.released.notify_all();
        }
    }

    /// Release an exclusive lock. No-op when not held.
    pub fn release_exclusive(&self, session: SessionId) {
        let mut state = self.state();
        if state.exclusive == Some(session) {
            state.exclusive = None;
            drop(state);
            self.released.notify_all();
        }
    }

    /// Release whatever `session` holds
    pub fn release_all(&self, session: SessionId) {
        let mut state = self.state();
        let had_shared = state.shared.remove(&session);
        let had_exclusive = state.exclusive == Some(session);
        if had_exclusive {
            state.exclusive = None;
        }
        drop(state);
        if had_shared || had_exclusive {
            self.released.notify_all();
        }
    }

    /// Check whether `session` holds the lock in `mode`
    pub fn holds(&self, session: SessionId, mode: LockMode) -> bool {
        let state = self.state();
        match mode {
            LockMode::Shared => state.shared.contains(&session),
            LockMode::Exclusive => state.exclusive == Some(session),
        }
    }
}
