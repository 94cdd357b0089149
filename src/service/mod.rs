//! The inbound surface: per-image generation, batch scans and review.

mod lock;
mod review;
mod scan;
mod status;

use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::generate::{
    GenerationRequest, Generator, ImageContext, format_examples, prompt::EXAMPLE_LIMIT,
    site_summary,
};
use crate::media::{ImageItem, MediaLibrary};
use crate::provider::VisionApi;
use crate::state::{self, StateStore, keys};
use crate::suggestion::{NewSuggestion, SuggestionRecord, SuggestionStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use lock::{LOCK_TTL_MINUTES, LockAttempt, RunLock, RunLockGuard};
pub use review::{ActivityEntry, ActivityKind};
pub use status::{BatchStats, LastRun, RunState, RunStatus, ScanOutcome, format_elapsed};

pub struct AltTextService {
    pub(crate) config: Config,
    pub(crate) library: Arc<dyn MediaLibrary>,
    pub(crate) suggestions: Arc<dyn SuggestionStore>,
    pub(crate) state: Arc<dyn StateStore>,
    pub(crate) catalog: Arc<ModelCatalog>,
    pub(crate) generator: Generator,
    pub(crate) clock: Arc<dyn Clock>,
}

impl AltTextService {
    #[must_use]
    pub fn new(
        config: Config,
        api: Arc<dyn VisionApi>,
        library: Arc<dyn MediaLibrary>,
        suggestions: Arc<dyn SuggestionStore>,
        state: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let catalog = Arc::new(ModelCatalog::new(api.clone(), state.clone(), clock.clone()));
        let generator = Generator::new(api, catalog.clone(), clock.clone());
        Self {
            config,
            library,
            suggestions,
            state,
            catalog,
            generator,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Generate and store a pending suggestion for one image. Always calls
    /// the upstream, even when a pending suggestion already exists.
    pub async fn generate_for_image(&self, image_id: i64) -> Result<SuggestionRecord> {
        let image = self
            .library
            .get_image(image_id)?
            .ok_or_else(|| Error::NotFound(format!("image {image_id}")))?;
        if !image.is_image() {
            return Err(Error::InvalidImage(format!(
                "attachment {image_id} has type '{}'",
                image.mime_type
            )));
        }
        self.generate_and_store(&image).await
    }

    pub(crate) async fn generate_and_store(&self, image: &ImageItem) -> Result<SuggestionRecord> {
        let request = GenerationRequest {
            image_url: image.url.clone(),
            context: self.image_context(image)?,
            instructions: self.config.instructions().map(ToString::to_string),
            model_override: self.config.model.pinned().map(ToString::to_string),
        };
        let result = self.generator.generate(&request).await?;

        let record = self.suggestions.insert(&NewSuggestion {
            image_id: image.id,
            alt_text: result.alt_text,
            model: result.model,
            request_payload: result.request_payload,
            response_body: result.response_body,
            duration_secs: result.duration.as_secs_f64(),
            created_at: self.clock.now(),
        })?;
        tracing::info!(
            image = image.id,
            suggestion = record.id,
            model = %record.model,
            "Stored suggestion"
        );
        Ok(record)
    }

    fn image_context(&self, image: &ImageItem) -> Result<ImageContext> {
        let site = &self.config.site;
        let examples = self.library.example_alt_texts(EXAMPLE_LIMIT)?;
        Ok(ImageContext {
            title: image.title.clone(),
            caption: image.caption.clone(),
            description: image.description.clone(),
            site: site_summary(&site.name, &site.description, &site.categories),
            examples: format_examples(&examples),
        })
    }

    /// Usable vision models of one tier, best first.
    pub async fn vision_models(
        &self,
        free_only: bool,
        force_refresh: bool,
    ) -> Result<Vec<ModelDescriptor>> {
        self.catalog.vision_models(free_only, force_refresh).await
    }

    /// Refetch the catalog and forget every exhaustion mark.
    pub async fn refresh_models(&self) -> Result<Vec<ModelDescriptor>> {
        self.catalog.invalidate()?;
        self.catalog.exhaustion().clear()?;
        tracing::info!("Cleared model cache and exhaustion marks");
        self.catalog.list_models(true).await
    }

    pub fn run_status(&self) -> Result<Option<RunStatus>> {
        state::get_json(self.state.as_ref(), keys::RUN_STATUS)
    }

    pub fn last_run(&self) -> Result<Option<LastRun>> {
        state::get_json(self.state.as_ref(), keys::LAST_RUN)
    }

    pub fn last_attempt(&self) -> Result<Option<DateTime<Utc>>> {
        state::get_json(self.state.as_ref(), keys::LAST_ATTEMPT)
    }
}
