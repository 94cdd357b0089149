//! Suggestion records and the store that owns them.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Applied,
    Rejected,
}

impl SuggestionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "applied" => Ok(Self::Applied),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown suggestion status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub id: i64,
    pub image_id: i64,
    pub alt_text: String,
    pub status: SuggestionStatus,
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// Set when the record leaves `pending`, for either terminal status.
    pub applied_at: Option<DateTime<Utc>>,
    pub request_payload: String,
    pub response_body: String,
    pub duration_secs: f64,
}

/// A freshly generated suggestion. Always stored as `pending`.
#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub image_id: i64,
    pub alt_text: String,
    pub model: String,
    pub request_payload: String,
    pub response_body: String,
    pub duration_secs: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionCounts {
    pub pending: u64,
    pub applied: u64,
    pub rejected: u64,
    pub total: u64,
}

pub trait SuggestionStore: Send + Sync {
    fn insert(&self, suggestion: &NewSuggestion) -> Result<SuggestionRecord>;

    fn get(&self, id: i64) -> Result<Option<SuggestionRecord>>;

    /// Most recent record for `image_id` in `status`.
    fn latest_for_image(
        &self,
        image_id: i64,
        status: SuggestionStatus,
    ) -> Result<Option<SuggestionRecord>>;

    /// Move a `pending` record to a terminal status. Returns false when the
    /// record is missing or already terminal.
    fn resolve(&self, id: i64, status: SuggestionStatus, at: DateTime<Utc>) -> Result<bool>;

    /// Newest first.
    fn list(
        &self,
        status: Option<SuggestionStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SuggestionRecord>>;

    fn counts(&self) -> Result<SuggestionCounts>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            SuggestionStatus::Pending,
            SuggestionStatus::Applied,
            SuggestionStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<SuggestionStatus>(), Ok(status));
        }
        assert!("archived".parse::<SuggestionStatus>().is_err());
        assert_eq!(" Applied ".parse(), Ok(SuggestionStatus::Applied));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SuggestionStatus::Pending.is_terminal());
        assert!(SuggestionStatus::Applied.is_terminal());
        assert!(SuggestionStatus::Rejected.is_terminal());
    }
}
