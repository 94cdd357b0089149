//! Vision model selection and ranking.
//!
//! The upstream catalog has no formal capability flags, so free-tier and vision
//! support are substring heuristics over the human-readable fields.

use super::ModelCatalog;
use super::types::ModelDescriptor;
use crate::error::Result;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Id suffix marking no-cost variants.
pub const FREE_MARKER: &str = ":free";
/// Minimum context window, enough for the full prompt plus the image.
pub const MIN_CONTEXT_LENGTH: u64 = 96_000;
const VISION_KEYWORD: &str = "vision";

/// Model family keywords and their priority. When several match, the last one
/// in table order wins.
const PRIORITY_KEYWORDS: &[(&str, u32)] = &[
    ("claude-3", 5),
    ("gpt-4", 4),
    ("gemini", 3),
    ("llama", 2),
    ("mistral", 1),
];

#[must_use]
pub fn is_free_model(id: &str) -> bool {
    id.contains(FREE_MARKER)
}

#[must_use]
pub fn is_vision_capable(id: &str, name: &str, description: &str) -> bool {
    [description, name, id]
        .iter()
        .any(|field| field.to_lowercase().contains(VISION_KEYWORD))
}

#[must_use]
pub fn has_well_formed_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(char::is_whitespace)
}

#[must_use]
pub fn priority_score(id: &str) -> u32 {
    let id = id.to_lowercase();
    PRIORITY_KEYWORDS
        .iter()
        .filter(|(keyword, _)| id.contains(keyword))
        .map(|(_, score)| *score)
        .last()
        .unwrap_or(0)
}

/// Higher priority first, then larger context, then id.
#[must_use]
pub fn compare_models(a: &ModelDescriptor, b: &ModelDescriptor) -> Ordering {
    priority_score(&b.id)
        .cmp(&priority_score(&a.id))
        .then_with(|| b.context_length.cmp(&a.context_length))
        .then_with(|| a.id.cmp(&b.id))
}

/// Check if a model passes every selection predicate.
#[must_use]
pub fn model_matches(model: &ModelDescriptor, free_only: bool, exhausted: &HashSet<String>) -> bool {
    let has_context = model.context_length >= MIN_CONTEXT_LENGTH;
    let is_exhausted = exhausted.contains(&model.id);

    tracing::debug!(
        model = %model.id,
        free = model.is_free,
        context = has_context,
        vision = model.supports_vision,
        exhausted = is_exhausted,
        "Evaluating model"
    );

    has_well_formed_id(&model.id)
        && model.is_free == free_only
        && has_context
        && model.supports_vision
        && !is_exhausted
}

/// Filter and rank a catalog snapshot.
#[must_use]
pub fn select_vision_models(
    models: &[ModelDescriptor],
    free_only: bool,
    exhausted: &HashSet<String>,
) -> Vec<ModelDescriptor> {
    let mut selected: Vec<ModelDescriptor> = models
        .iter()
        .filter(|m| model_matches(m, free_only, exhausted))
        .cloned()
        .collect();
    selected.sort_by(compare_models);
    selected
}

impl ModelCatalog {
    /// Usable vision models of one tier, best first. Exhausted models are
    /// excluded using the tracker's current snapshot.
    pub async fn vision_models(
        &self,
        free_only: bool,
        force_refresh: bool,
    ) -> Result<Vec<ModelDescriptor>> {
        let models = self.list_models(force_refresh).await?;
        let exhausted = self.exhaustion.snapshot()?;
        let selected = select_vision_models(&models, free_only, &exhausted);

        let tier = if free_only { "free" } else { "paid" };
        match selected.first() {
            Some(best) => tracing::info!(
                tier,
                count = selected.len(),
                best = %best.id,
                "Filtered vision models"
            ),
            None => tracing::warn!(tier, "No vision models available"),
        }
        Ok(selected)
    }
}
