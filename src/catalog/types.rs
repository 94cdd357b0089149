//! Model descriptors and the cached catalog snapshot.

use super::filter::{is_free_model, is_vision_capable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One upstream model, classified once at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub context_length: u64,
    pub is_free: bool,
    pub supports_vision: bool,
    /// Upstream object as received.
    pub raw: Map<String, Value>,
}

impl ModelDescriptor {
    /// Classify a raw model object. Missing fields become empty/zero so the
    /// filter can reject them rather than the fetch failing.
    #[must_use]
    pub fn from_api(raw: Map<String, Value>) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let id = text("id");
        let name = text("name");
        let description = text("description");
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let context_length = raw
            .get("context_length")
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
            .unwrap_or(0);

        Self {
            is_free: is_free_model(&id),
            supports_vision: is_vision_capable(&id, &name, &description),
            id,
            name,
            description,
            context_length,
            raw,
        }
    }
}

/// Catalog snapshot persisted in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CatalogSnapshot {
    pub(crate) fetched_at: DateTime<Utc>,
    pub(crate) models: Vec<ModelDescriptor>,
}
