//! Models that recently answered 429.
//!
//! One set with one expiry: every new mark pushes the expiry of the whole set
//! out to [`EXHAUSTION_TTL_HOURS`] from now, and everything clears together.
//! Reads always go to the shared store so marks from other runs are visible.

use crate::clock::Clock;
use crate::error::Result;
use crate::state::{self, StateStore, keys};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub const EXHAUSTION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExhaustionRecord {
    pub models: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ExhaustionTracker {
    state: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl ExhaustionTracker {
    #[must_use]
    pub fn new(state: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { state, clock }
    }

    /// Current record, or an empty one once the window has lapsed.
    pub fn record(&self) -> Result<ExhaustionRecord> {
        let record: ExhaustionRecord =
            state::get_json(self.state.as_ref(), keys::EXHAUSTED_MODELS)?.unwrap_or_default();
        match record.expires_at {
            Some(expires_at) if expires_at <= self.clock.now() => Ok(ExhaustionRecord::default()),
            _ => Ok(record),
        }
    }

    pub fn snapshot(&self) -> Result<HashSet<String>> {
        Ok(self.record()?.models.into_iter().collect())
    }

    pub fn is_exhausted(&self, model_id: &str) -> Result<bool> {
        Ok(self.record()?.models.iter().any(|m| m == model_id))
    }

    /// Add `model_id` and restart the shared expiry window.
    pub fn mark_exhausted(&self, model_id: &str) -> Result<()> {
        let mut record = self.record()?;
        if !record.models.iter().any(|m| m == model_id) {
            record.models.push(model_id.to_string());
        }
        let ttl = TimeDelta::hours(EXHAUSTION_TTL_HOURS);
        record.expires_at = Some(self.clock.now() + ttl);

        tracing::warn!(
            model = model_id,
            exhausted = record.models.len(),
            "Marked model as exhausted"
        );
        state::set_json(self.state.as_ref(), keys::EXHAUSTED_MODELS, &record, Some(ttl))
    }

    pub fn clear(&self) -> Result<()> {
        self.state.delete(keys::EXHAUSTED_MODELS)
    }
}
