//! Scan statistics and the run records kept in the state store.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Images lacking alt text when the scan started.
    pub found: usize,
    /// Items admitted, including ones skipped by the per-item checks.
    pub processed: usize,
    pub generated: usize,
    /// Items that already had a pending suggestion.
    pub skipped: usize,
    /// Items with an applied suggestion or existing alt text.
    pub already_processed: usize,
    pub failed: usize,
    pub remaining: usize,
    pub runtime_minutes: f64,
    /// The wall-clock budget ran out before the batch finished.
    pub budget_exhausted: bool,
    pub last_error: Option<String>,
}

impl BatchStats {
    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.remaining = self
            .found
            .saturating_sub(self.generated + self.already_processed);
        self.runtime_minutes = (elapsed.as_secs_f64() / 60.0 * 10.0).round() / 10.0;
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Generated {} alt tags from {} processed images (found {} total)",
            self.generated, self.processed, self.found
        )
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    /// Another run holds the lock.
    Skipped { running_since: DateTime<Utc> },
    Completed(BatchStats),
    /// Preflight failed or a batch-fatal error stopped the run early.
    Failed { error: Error, stats: BatchStats },
}

impl ScanOutcome {
    #[must_use]
    pub fn stats(&self) -> Option<&BatchStats> {
        match self {
            Self::Skipped { .. } => None,
            Self::Completed(stats) | Self::Failed { stats, .. } => Some(stats),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Skipped,
    Running,
    Completed,
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skipped => "skipped",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        })
    }
}

/// Latest scan attempt, whatever its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub timestamp: DateTime<Utc>,
    pub state: RunState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<BatchStats>,
}

/// Latest scan that ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    pub timestamp: DateTime<Utc>,
    pub stats: BatchStats,
}

/// Short human form of a duration, e.g. `4m 10s`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_computes_remaining_and_runtime() {
        let mut stats = BatchStats {
            found: 10,
            generated: 3,
            already_processed: 2,
            ..Default::default()
        };
        stats.finish(Duration::from_secs(95));
        assert_eq!(stats.remaining, 5);
        assert!((stats.runtime_minutes - 1.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remaining_never_underflows() {
        let mut stats = BatchStats {
            found: 1,
            generated: 2,
            ..Default::default()
        };
        stats.finish(Duration::ZERO);
        assert_eq!(stats.remaining, 0);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(250)), "4m 10s");
        assert_eq!(format_elapsed(Duration::from_secs(7380)), "2h 3m");
    }

    #[test]
    fn test_run_status_serialization() {
        let status = RunStatus {
            timestamp: DateTime::from_timestamp(0, 0).unwrap(),
            state: RunState::Skipped,
            message: "Process already running".into(),
            stats: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "skipped");
        assert!(json.get("stats").is_none());
    }
}
