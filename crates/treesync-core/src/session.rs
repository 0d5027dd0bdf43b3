//! Exclusive write session held by one device at a time.
//!
//! The lock guards client-visible semantics, not memory: a device holding a
//! fresh session is the only one whose mutating requests are accepted. A
//! session that has not been refreshed within the timeout may be reclaimed
//! by anyone, so a crashed client cannot wedge the server.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::error::SyncError;

/// Staleness window after which an unreleased session may be reclaimed.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// What a given device can observe about the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// A fresh session exists (held by anyone).
    pub locked: bool,
    /// The asking device holds the session.
    pub owned: bool,
    /// Unix millis after which the session becomes reclaimable.
    pub expires_at: Option<i64>,
}

#[derive(Debug)]
struct SessionState {
    owner: Option<String>,
    last_change: i64,
}

#[derive(Debug)]
pub struct SessionLock {
    state: Mutex<SessionState>,
    timeout_ms: i64,
    clock: SharedClock,
}

impl SessionLock {
    pub fn new(clock: SharedClock, timeout: Duration) -> Self {
        let last_change = clock.now_millis();
        Self {
            state: Mutex::new(SessionState {
                owner: None,
                last_change,
            }),
            timeout_ms: i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX),
            clock,
        }
    }

    fn is_fresh(&self, state: &SessionState, now: i64) -> bool {
        now.saturating_sub(state.last_change) <= self.timeout_ms
    }

    /// Held by someone other than `identity` and not yet stale.
    fn blocks(&self, state: &SessionState, identity: &str, now: i64) -> bool {
        match state.owner.as_deref() {
            Some(owner) => owner != identity && self.is_fresh(state, now),
            None => false,
        }
    }

    /// Acquire (or refresh) the session for `identity`.
    pub fn begin_session(&self, identity: &str) -> Result<(), SyncError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().expect("session lock poisoned");

        if self.blocks(&state, identity, now) {
            warn!("Session request refused: held by another device");
            return Err(SyncError::Conflict);
        }

        match state.owner.as_deref() {
            Some(owner) if owner == identity => {}
            Some(_) => info!(
                "Reclaiming stale session (idle for {} ms)",
                now.saturating_sub(state.last_change)
            ),
            None => info!("Session acquired"),
        }

        state.owner = Some(identity.to_string());
        state.last_change = now;
        Ok(())
    }

    /// Release the session.
    ///
    /// Only the owner may release a fresh session; releasing when nothing
    /// is held, or when the holder has gone stale, succeeds.
    pub fn end_session(&self, identity: &str) -> Result<(), SyncError> {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().expect("session lock poisoned");

        if self.blocks(&state, identity, now) {
            warn!("Session release refused: caller is not the owner");
            return Err(SyncError::Conflict);
        }

        if state.owner.take().is_some() {
            state.last_change = now;
            info!("Session released");
        }
        Ok(())
    }

    /// Succeeds when `identity` may mutate the tree right now. Does not
    /// refresh the session.
    pub fn check_ownership(&self, identity: &str) -> Result<(), SyncError> {
        let now = self.clock.now_millis();
        let state = self.state.lock().expect("session lock poisoned");

        if self.blocks(&state, identity, now) {
            return Err(SyncError::Conflict);
        }
        Ok(())
    }

    pub fn view(&self, identity: &str) -> SessionView {
        let now = self.clock.now_millis();
        let state = self.state.lock().expect("session lock poisoned");

        let held = state.owner.is_some() && self.is_fresh(&state, now);
        SessionView {
            locked: held,
            owned: held && state.owner.as_deref() == Some(identity),
            expires_at: held.then(|| state.last_change.saturating_add(self.timeout_ms)),
        }
    }
}
