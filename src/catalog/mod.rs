//! Model catalog with caching and filtering.
//!
//! The full upstream listing is cached in memory and in the state store for
//! [`CATALOG_TTL_HOURS`]; filtered views are computed from that snapshot.

mod filter;
mod types;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::exhaustion::ExhaustionTracker;
use crate::provider::VisionApi;
use crate::state::{self, StateStore, keys};
use chrono::TimeDelta;
use std::sync::{Arc, RwLock};

pub use filter::{
    FREE_MARKER, MIN_CONTEXT_LENGTH, compare_models, has_well_formed_id, is_free_model,
    is_vision_capable, model_matches, priority_score, select_vision_models,
};
pub use types::ModelDescriptor;
use types::CatalogSnapshot;

/// How long a fetched catalog stays valid.
pub const CATALOG_TTL_HOURS: i64 = 12;

/// Cached view of the upstream model catalog.
pub struct ModelCatalog {
    api: Arc<dyn VisionApi>,
    state: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    exhaustion: ExhaustionTracker,
    cache: RwLock<Option<CatalogSnapshot>>,
    ttl: TimeDelta,
}

impl ModelCatalog {
    #[must_use]
    pub fn new(api: Arc<dyn VisionApi>, state: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        let exhaustion = ExhaustionTracker::new(state.clone(), clock.clone());
        Self {
            api,
            state,
            clock,
            exhaustion,
            cache: RwLock::new(None),
            ttl: TimeDelta::hours(CATALOG_TTL_HOURS),
        }
    }

    #[must_use]
    pub fn exhaustion(&self) -> &ExhaustionTracker {
        &self.exhaustion
    }

    fn is_fresh(&self, snapshot: &CatalogSnapshot) -> bool {
        self.clock.now() - snapshot.fetched_at < self.ttl
    }

    /// Valid snapshot from memory, then from the shared state store.
    fn cached(&self) -> Result<Option<Vec<ModelDescriptor>>> {
        {
            let cache = self
                .cache
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(snapshot) = cache.as_ref()
                && self.is_fresh(snapshot)
            {
                return Ok(Some(snapshot.models.clone()));
            }
        }

        let Some(snapshot) =
            state::get_json::<CatalogSnapshot>(self.state.as_ref(), keys::MODEL_CATALOG)?
        else {
            return Ok(None);
        };
        if !self.is_fresh(&snapshot) {
            return Ok(None);
        }
        let models = snapshot.models.clone();
        *self
            .cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(snapshot);
        Ok(Some(models))
    }

    /// Full catalog. One upstream call on a miss or forced refresh, none on a hit.
    /// Failed fetches are never cached.
    pub async fn list_models(&self, force_refresh: bool) -> Result<Vec<ModelDescriptor>> {
        if !force_refresh && let Some(models) = self.cached()? {
            return Ok(models);
        }

        if !self.api.has_credential() {
            return Err(Error::NoCredential);
        }

        let raw = self.api.list_models().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to fetch models");
        })?;
        let models: Vec<ModelDescriptor> = raw
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::Object(map) => Some(ModelDescriptor::from_api(map)),
                _ => None,
            })
            .collect();
        tracing::info!(count = models.len(), "Fetched model catalog");

        let snapshot = CatalogSnapshot {
            fetched_at: self.clock.now(),
            models: models.clone(),
        };
        state::set_json(
            self.state.as_ref(),
            keys::MODEL_CATALOG,
            &snapshot,
            Some(self.ttl),
        )?;
        *self
            .cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(snapshot);

        Ok(models)
    }

    /// Look up one model by exact id.
    pub async fn find_model(&self, id: &str) -> Result<Option<ModelDescriptor>> {
        Ok(self
            .list_models(false)
            .await?
            .into_iter()
            .find(|m| m.id == id))
    }

    /// Drop the cached snapshot so the next listing refetches.
    pub fn invalidate(&self) -> Result<()> {
        *self
            .cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        self.state.delete(keys::MODEL_CATALOG)
    }
}
