// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Single-session lock and the session state machine

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

use super::OrganizeSession;
use crate::report::SessionReport;
use crate::{PictorError, Result};

/// `Idle → Running → {Completed | Aborted}`
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Running(OrganizeSession),
    Completed(SessionReport),
    Aborted { session_id: String },
}

/// Owner of the session state; at most one session may be `Running`
#[derive(Clone)]
pub struct SessionLock {
    state: Arc<Mutex<SessionState>>,
}

impl Default for SessionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Idle)),
        }
    }

    fn guard(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.guard(), SessionState::Running(_))
    }

    pub fn snapshot(&self) -> SessionState {
        self.guard().clone()
    }

    /// Enter `Running` with a fresh session; fails without touching
    /// anything if another session holds the lock.
    pub fn acquire(&self, session: OrganizeSession) -> Result<SessionGuard> {
        let mut state = self.guard();
        if matches!(*state, SessionState::Running(_)) {
            return Err(PictorError::SessionAlreadyActive);
        }
        *state = SessionState::Running(session);
        Ok(SessionGuard {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }
}

/// Held for the whole run; dropping it without `complete` aborts the session
pub struct SessionGuard {
    state: Arc<Mutex<SessionState>>,
    finished: bool,
}

impl SessionGuard {
    fn guard(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the running session
    pub fn update(&self, f: impl FnOnce(&mut OrganizeSession)) {
        if let SessionState::Running(session) = &mut *self.guard() {
            f(session);
        }
    }

    pub fn current(&self) -> Option<OrganizeSession> {
        match &*self.guard() {
            SessionState::Running(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Release the lock and record the final report
    pub fn complete(mut self, report: SessionReport) {
        *self.guard() = SessionState::Completed(report);
        self.finished = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.guard();
        let running = match &*state {
            SessionState::Running(session) => Some(session.id.clone()),
            _ => None,
        };
        if let Some(session_id) = running {
            warn!(session_id = %session_id, "Session ended without completing");
            *state = SessionState::Aborted { session_id };
        }
    }
}
