//! Alt text generation with model fallback.
//!
//! Candidates are tried strictly in order. Per-candidate failures are absorbed
//! and only the last one surfaces; a 429 additionally marks the model exhausted
//! so later requests skip it.

pub mod prompt;
#[cfg(test)]
mod tests;
pub mod text;

use crate::catalog::ModelCatalog;
use crate::clock::{Clock, elapsed_between};
use crate::error::{Error, Result};
use crate::provider::{CompletionResponse, VisionApi};
use std::sync::Arc;
use std::time::Duration;

pub use prompt::{build_request, format_examples, site_summary};
pub use text::{MAX_ALT_TEXT_CHARS, sanitize_alt_text, trim_words};

/// Model selection value meaning "use the ranked free pool".
pub const FREE_SELECTION: &str = "free";

/// Per-image context folded into the prompt. Empty fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageContext {
    pub title: String,
    pub caption: String,
    pub description: String,
    /// Site summary block.
    pub site: String,
    /// Preformatted example alt texts.
    pub examples: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub image_url: String,
    pub context: ImageContext,
    pub instructions: Option<String>,
    /// Pinned model id tried before the free pool.
    pub model_override: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Cleaned text, at most [`MAX_ALT_TEXT_CHARS`] code points.
    pub alt_text: String,
    /// Candidate id that produced the text.
    pub model: String,
    pub response_body: String,
    pub request_payload: String,
    pub duration: Duration,
}

pub struct Generator {
    api: Arc<dyn VisionApi>,
    catalog: Arc<ModelCatalog>,
    clock: Arc<dyn Clock>,
}

impl Generator {
    #[must_use]
    pub fn new(api: Arc<dyn VisionApi>, catalog: Arc<ModelCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            catalog,
            clock,
        }
    }

    #[must_use]
    pub fn has_credential(&self) -> bool {
        self.api.has_credential()
    }

    /// Ordered candidate ids: a usable override first, then the ranked free
    /// vision pool, without duplicates.
    pub async fn candidates(&self, model_override: Option<&str>) -> Result<Vec<String>> {
        let mut candidates = Vec::new();

        if let Some(id) = model_override
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != FREE_SELECTION)
        {
            match self.catalog.find_model(id).await? {
                Some(model) if model.supports_vision => candidates.push(model.id),
                Some(_) => {
                    tracing::warn!(model = id, "Pinned model lacks vision support, using free models");
                }
                None => {
                    tracing::warn!(model = id, "Pinned model not found, using free models");
                }
            }
        }

        for model in self.catalog.vision_models(true, false).await? {
            if !candidates.contains(&model.id) {
                candidates.push(model.id);
            }
        }
        Ok(candidates)
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        if !self.has_credential() {
            return Err(Error::NoCredential);
        }

        let candidates = self.candidates(request.model_override.as_deref()).await?;
        if candidates.is_empty() {
            tracing::warn!("No candidate models for generation");
            return Err(Error::NoSuitableModels);
        }

        let exhaustion = self.catalog.exhaustion();
        let mut last_error: Option<Error> = None;

        for model in &candidates {
            if exhaustion.is_exhausted(model)? {
                tracing::debug!(model = %model, "Skipping exhausted model");
                continue;
            }

            let chat = build_request(
                model,
                &request.image_url,
                &request.context,
                request.instructions.as_deref(),
            );
            let request_payload = serde_json::to_string(&chat)?;
            let started = self.clock.now();
            tracing::info!(model = %model, image = %request.image_url, "Requesting alt text");

            let outcome = match self.api.complete(&chat).await {
                Ok(body) => extract_alt_text(&body).map(|alt_text| (alt_text, body)),
                Err(e) => Err(e),
            };
            let duration = elapsed_between(started, self.clock.now());

            match outcome {
                Ok((alt_text, response_body)) => {
                    tracing::info!(
                        model = %model,
                        duration_ms = duration.as_millis(),
                        chars = alt_text.chars().count(),
                        "Generated alt text"
                    );
                    return Ok(GenerationResult {
                        alt_text,
                        model: model.clone(),
                        response_body,
                        request_payload,
                        duration,
                    });
                }
                Err(e @ Error::QuotaExceeded { .. }) => {
                    exhaustion.mark_exhausted(model)?;
                    last_error = Some(e);
                }
                Err(e) if e.is_candidate_failure() => {
                    tracing::warn!(model = %model, error = %e, "Candidate failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(Error::NoSuitableModels))
    }
}

/// Pull the completion text out of a 2xx body and clean it.
fn extract_alt_text(body: &str) -> Result<String> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("completion is not JSON: {e}")))?;
    let content = parsed.first_content().ok_or_else(|| {
        Error::MalformedResponse("missing choices[0].message.content".to_string())
    })?;
    let alt_text = text::finalize_alt_text(content);
    if alt_text.is_empty() {
        return Err(Error::MalformedResponse("completion text is empty".to_string()));
    }
    Ok(alt_text)
}
