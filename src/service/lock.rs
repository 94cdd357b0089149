//! Process-wide scan lock held in the shared state store.

use crate::clock::Clock;
use crate::error::Result;
use crate::state::{self, StateStore, keys};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A lock older than this is considered abandoned.
pub const LOCK_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LockStamp {
    acquired_at: DateTime<Utc>,
}

pub enum LockAttempt {
    Acquired(RunLockGuard),
    Held { since: DateTime<Utc> },
}

/// Releases the lock when dropped, on every exit path.
pub struct RunLockGuard {
    state: Arc<dyn StateStore>,
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        match self.state.delete(keys::RUN_LOCK) {
            Ok(()) => tracing::debug!("Released run lock"),
            Err(e) => tracing::error!(error = %e, "Failed to release run lock"),
        }
    }
}

pub struct RunLock;

impl RunLock {
    /// Take the lock without waiting. A stale holder is cleared first.
    pub fn acquire(state: &Arc<dyn StateStore>, clock: &dyn Clock) -> Result<LockAttempt> {
        let now = clock.now();
        let ttl = TimeDelta::minutes(LOCK_TTL_MINUTES);

        if let Some(stamp) = state::get_json::<LockStamp>(state.as_ref(), keys::RUN_LOCK)?
            && now - stamp.acquired_at > ttl
        {
            tracing::warn!(since = %stamp.acquired_at, "Clearing stale run lock");
            state.delete(keys::RUN_LOCK)?;
        }

        let stamp = serde_json::to_value(LockStamp { acquired_at: now })?;
        if state.set_if_absent(keys::RUN_LOCK, stamp, Some(ttl))? {
            tracing::debug!("Acquired run lock");
            return Ok(LockAttempt::Acquired(RunLockGuard {
                state: state.clone(),
            }));
        }

        let since = state::get_json::<LockStamp>(state.as_ref(), keys::RUN_LOCK)?
            .map_or(now, |stamp| stamp.acquired_at);
        Ok(LockAttempt::Held { since })
    }
}
