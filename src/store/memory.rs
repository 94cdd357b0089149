//! In-process store for tests and embedders that bring their own persistence.

use crate::clock::Clock;
use crate::error::Result;
use crate::media::{ImageItem, MediaLibrary, MissingAltPage, MissingAltQuery, NewImage, order_key};
use crate::state::StateStore;
use crate::suggestion::{
    NewSuggestion, SuggestionCounts, SuggestionRecord, SuggestionStatus, SuggestionStore,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Inner {
    state: HashMap<String, (Value, Option<DateTime<Utc>>)>,
    images: BTreeMap<i64, ImageItem>,
    suggestions: Vec<SuggestionRecord>,
    next_image_id: i64,
    next_suggestion_id: i64,
}

/// Implements every collaborator trait over plain collections. Expiry is
/// judged against the injected clock.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_image(&self, image: &NewImage) -> i64 {
        let mut inner = self.lock();
        inner.next_image_id += 1;
        let id = inner.next_image_id;
        inner.images.insert(
            id,
            ImageItem {
                id,
                url: image.url.clone(),
                mime_type: image.mime_type.clone(),
                title: image.title.clone(),
                caption: image.caption.clone(),
                description: image.description.clone(),
                alt_text: image.alt_text.clone(),
            },
        );
        id
    }

    #[must_use]
    pub fn list_images(&self) -> Vec<ImageItem> {
        self.lock().images.values().cloned().collect()
    }

    fn is_live(&self, expires_at: Option<DateTime<Utc>>) -> bool {
        expires_at.is_none_or(|at| at > self.clock.now())
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let inner = self.lock();
        Ok(inner
            .state
            .get(key)
            .filter(|(_, expires_at)| self.is_live(*expires_at))
            .map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<()> {
        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        self.lock()
            .state
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    fn set_if_absent(&self, key: &str, value: Value, ttl: Option<TimeDelta>) -> Result<bool> {
        let mut inner = self.lock();
        if let Some((_, expires_at)) = inner.state.get(key)
            && self.is_live(*expires_at)
        {
            return Ok(false);
        }
        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        inner.state.insert(key.to_string(), (value, expires_at));
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock().state.remove(key);
        Ok(())
    }
}

impl MediaLibrary for MemoryStore {
    fn missing_alt_page(&self, query: MissingAltQuery) -> Result<MissingAltPage> {
        let inner = self.lock();
        let mut missing: Vec<(u64, &ImageItem)> = inner
            .images
            .values()
            .filter(|image| image.is_image() && !image.has_alt_text())
            .map(|image| (order_key(query.seed, image.id), image))
            .collect();
        let total = missing.len();

        missing.retain(|(key, _)| query.after.is_none_or(|after| *key > after));
        missing.sort_by_key(|(key, _)| *key);
        missing.truncate(query.limit);

        let next = if query.limit > 0 && missing.len() == query.limit {
            missing.last().map(|(key, _)| *key)
        } else {
            None
        };
        Ok(MissingAltPage {
            total,
            items: missing.into_iter().map(|(_, image)| image.clone()).collect(),
            next,
        })
    }

    fn get_image(&self, id: i64) -> Result<Option<ImageItem>> {
        Ok(self.lock().images.get(&id).cloned())
    }

    fn set_alt_text(&self, id: i64, alt_text: &str) -> Result<bool> {
        Ok(self
            .lock()
            .images
            .get_mut(&id)
            .map(|image| image.alt_text = alt_text.to_string())
            .is_some())
    }

    fn example_alt_texts(&self, limit: usize) -> Result<Vec<(String, String)>> {
        Ok(self
            .lock()
            .images
            .values()
            .rev()
            .filter(|image| image.is_image() && image.has_alt_text())
            .take(limit)
            .map(|image| (image.title.clone(), image.alt_text.clone()))
            .collect())
    }
}

impl SuggestionStore for MemoryStore {
    fn insert(&self, suggestion: &NewSuggestion) -> Result<SuggestionRecord> {
        let mut inner = self.lock();
        inner.next_suggestion_id += 1;
        let record = SuggestionRecord {
            id: inner.next_suggestion_id,
            image_id: suggestion.image_id,
            alt_text: suggestion.alt_text.clone(),
            status: SuggestionStatus::Pending,
            model: suggestion.model.clone(),
            created_at: suggestion.created_at,
            applied_at: None,
            request_payload: suggestion.request_payload.clone(),
            response_body: suggestion.response_body.clone(),
            duration_secs: suggestion.duration_secs,
        };
        inner.suggestions.push(record.clone());
        Ok(record)
    }

    fn get(&self, id: i64) -> Result<Option<SuggestionRecord>> {
        Ok(self.lock().suggestions.iter().find(|s| s.id == id).cloned())
    }

    fn latest_for_image(
        &self,
        image_id: i64,
        status: SuggestionStatus,
    ) -> Result<Option<SuggestionRecord>> {
        Ok(self
            .lock()
            .suggestions
            .iter()
            .filter(|s| s.image_id == image_id && s.status == status)
            .max_by_key(|s| (s.created_at, s.id))
            .cloned())
    }

    fn resolve(&self, id: i64, status: SuggestionStatus, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.lock();
        let Some(record) = inner
            .suggestions
            .iter_mut()
            .find(|s| s.id == id && s.status == SuggestionStatus::Pending)
        else {
            return Ok(false);
        };
        record.status = status;
        record.applied_at = Some(at);
        Ok(true)
    }

    fn list(
        &self,
        status: Option<SuggestionStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SuggestionRecord>> {
        let inner = self.lock();
        let mut records: Vec<&SuggestionRecord> = inner
            .suggestions
            .iter()
            .filter(|s| status.is_none_or(|status| s.status == status))
            .collect();
        records.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(records
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn counts(&self) -> Result<SuggestionCounts> {
        let inner = self.lock();
        let mut counts = SuggestionCounts::default();
        for record in &inner.suggestions {
            match record.status {
                SuggestionStatus::Pending => counts.pending += 1,
                SuggestionStatus::Applied => counts.applied += 1,
                SuggestionStatus::Rejected => counts.rejected += 1,
            }
            counts.total += 1;
        }
        Ok(counts)
    }
}
