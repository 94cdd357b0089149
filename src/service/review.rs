//! Review of stored suggestions: apply, reject and reporting.

use super::AltTextService;
use crate::error::{Error, Result};
use crate::generate::{sanitize_alt_text, trim_words};
use crate::suggestion::{SuggestionCounts, SuggestionRecord, SuggestionStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Alt text in activity entries is cut to this many words.
const ACTIVITY_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityKind {
    Generated,
    Applied,
    Rejected,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generated => "Generated",
            Self::Applied => "Applied",
            Self::Rejected => "Rejected",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub kind: ActivityKind,
    pub suggestion_id: i64,
    pub image_id: i64,
    pub image_title: String,
    /// Model reported by the upstream, for generated entries.
    pub model: Option<String>,
    pub alt_text: String,
}

/// Model id as reported in a stored completion body.
fn reported_model(record: &SuggestionRecord) -> String {
    serde_json::from_str::<serde_json::Value>(&record.response_body)
        .ok()
        .and_then(|body| body.get("model")?.as_str().map(ToString::to_string))
        .unwrap_or_else(|| record.model.clone())
}

impl AltTextService {
    /// Write a pending suggestion onto its image. False when the record is
    /// missing, no longer pending, or its image is gone.
    ///
    /// The record is resolved before the image is written; a record rejected
    /// concurrently leaves the image untouched.
    pub fn apply(&self, suggestion_id: i64) -> Result<bool> {
        let Some(record) = self.suggestions.get(suggestion_id)? else {
            return Ok(false);
        };
        if record.status != SuggestionStatus::Pending {
            tracing::debug!(suggestion = suggestion_id, status = %record.status, "Not pending");
            return Ok(false);
        }
        if self.library.get_image(record.image_id)?.is_none() {
            tracing::warn!(
                suggestion = suggestion_id,
                image = record.image_id,
                "Image no longer exists"
            );
            return Ok(false);
        }

        if !self
            .suggestions
            .resolve(suggestion_id, SuggestionStatus::Applied, self.clock.now())?
        {
            tracing::debug!(suggestion = suggestion_id, "Resolved elsewhere before apply");
            return Ok(false);
        }

        let alt_text = sanitize_alt_text(&record.alt_text);
        if !self.library.set_alt_text(record.image_id, &alt_text)? {
            tracing::warn!(
                suggestion = suggestion_id,
                image = record.image_id,
                "Image removed while applying"
            );
            return Ok(false);
        }
        tracing::info!(suggestion = suggestion_id, image = record.image_id, "Applied alt text");
        Ok(true)
    }

    /// One stored suggestion with its request payload, response body, model
    /// and duration.
    pub fn suggestion(&self, suggestion_id: i64) -> Result<SuggestionRecord> {
        self.suggestions
            .get(suggestion_id)?
            .ok_or_else(|| Error::NotFound(format!("suggestion {suggestion_id}")))
    }

    pub fn reject(&self, suggestion_id: i64) -> Result<bool> {
        let rejected =
            self.suggestions
                .resolve(suggestion_id, SuggestionStatus::Rejected, self.clock.now())?;
        if rejected {
            tracing::info!(suggestion = suggestion_id, "Rejected suggestion");
        }
        Ok(rejected)
    }

    pub fn counts(&self) -> Result<SuggestionCounts> {
        self.suggestions.counts()
    }

    pub fn list(
        &self,
        status: Option<SuggestionStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SuggestionRecord>> {
        self.suggestions.list(status, limit, offset)
    }

    /// Recent generated, applied and rejected events, newest first.
    pub fn activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let mut entries = Vec::new();
        let mut push = |record: &SuggestionRecord, kind: ActivityKind| -> Result<()> {
            let (at, model) = match kind {
                ActivityKind::Generated => (record.created_at, Some(reported_model(record))),
                _ => (record.applied_at.unwrap_or(record.created_at), None),
            };
            let image_title = self
                .library
                .get_image(record.image_id)?
                .map(|image| image.title)
                .unwrap_or_default();
            entries.push(ActivityEntry {
                at,
                kind,
                suggestion_id: record.id,
                image_id: record.image_id,
                image_title,
                model,
                alt_text: trim_words(&record.alt_text, ACTIVITY_WORDS),
            });
            Ok(())
        };

        // Resolutions go in first so that, on equal timestamps, the stable
        // sort lists them above the generation they resolve.
        for record in self.suggestions.list(Some(SuggestionStatus::Applied), limit, 0)? {
            push(&record, ActivityKind::Applied)?;
        }
        for record in self.suggestions.list(Some(SuggestionStatus::Rejected), limit, 0)? {
            push(&record, ActivityKind::Rejected)?;
        }
        for record in self.suggestions.list(None, limit, 0)? {
            push(&record, ActivityKind::Generated)?;
        }

        entries.sort_by(|a, b| b.at.cmp(&a.at));
        entries.truncate(limit);
        Ok(entries)
    }
}
