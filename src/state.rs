//! Key-value state shared across invocations (locks, exhaustion set, run status).
//!
//! Values are JSON documents with an optional time-to-live. Implementations
//! treat an expired entry exactly like a missing one.

use crate::error::Result;
use chrono::TimeDelta;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Keys used by the core.
pub mod keys {
    pub const MODEL_CATALOG: &str = "models";
    pub const EXHAUSTED_MODELS: &str = "exhausted_models";
    pub const RUN_LOCK: &str = "process_lock";
    pub const RUN_STATUS: &str = "run_status";
    pub const LAST_RUN: &str = "last_run";
    pub const LAST_ATTEMPT: &str = "last_attempt";
}

pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Insert or replace `key`. `ttl: None` never expires.
    fn set(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<()>;

    /// Insert only when no live entry exists. Returns whether the write happened.
    fn set_if_absent(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<bool>;

    fn delete(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a typed value. Undecodable entries read as missing.
pub fn get_json<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    let Some(value) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding undecodable state entry");
            Ok(None)
        }
    }
}

pub fn set_json<T: Serialize>(
    store: &dyn StateStore,
    key: &str,
    value: &T,
    ttl: Option<TimeDelta>,
) -> Result<()> {
    store.set(key, serde_json::to_value(value)?, ttl)
}
