//! Batch scan over images lacking alt text.

use super::lock::{LockAttempt, RunLock};
use super::status::{BatchStats, LastRun, RunState, RunStatus, ScanOutcome, format_elapsed};
use super::AltTextService;
use crate::clock::elapsed_between;
use crate::config::{BatchSize, OperationMode};
use crate::error::{Error, Result};
use crate::media::{ImageItem, MissingAltQuery, random_seed};
use crate::state::{self, keys};
use crate::suggestion::SuggestionStatus;
use chrono::{DateTime, Utc};

/// Page size when scanning the whole library.
pub const SCAN_PAGE_SIZE: usize = 100;

/// What happened to one admitted image.
enum ItemOutcome {
    Generated,
    Skipped,
    AlreadyProcessed,
    Failed(Error),
}

impl AltTextService {
    /// Run one batch. Returns `Skipped` immediately when another run holds
    /// the lock; the lock is released on every exit path.
    pub async fn scan(&self, limit: BatchSize) -> Result<ScanOutcome> {
        let now = self.clock.now();
        state::set_json(self.state.as_ref(), keys::LAST_ATTEMPT, &now, None)?;

        let _guard = match RunLock::acquire(&self.state, self.clock.as_ref())? {
            LockAttempt::Acquired(guard) => guard,
            LockAttempt::Held { since } => {
                let message = format!(
                    "Process already running since {} ago",
                    format_elapsed(elapsed_between(since, now))
                );
                tracing::info!(%since, "Scan skipped, another run holds the lock");
                self.record_status(RunState::Skipped, message, None)?;
                return Ok(ScanOutcome::Skipped {
                    running_since: since,
                });
            }
        };

        if let Err(error) = self.preflight().await {
            tracing::error!(error = %error, "Scan preflight failed");
            self.record_status(RunState::Error, error.to_string(), None)?;
            return Ok(ScanOutcome::Failed {
                error,
                stats: BatchStats::default(),
            });
        }

        self.record_status(RunState::Running, "Scan in progress".to_string(), None)?;
        tracing::info!(batch = %limit, mode = ?self.config.mode, "Starting scan");

        let (stats, fatal) = self.run_batch(limit).await;

        tracing::info!(
            found = stats.found,
            processed = stats.processed,
            generated = stats.generated,
            skipped = stats.skipped,
            already_processed = stats.already_processed,
            failed = stats.failed,
            remaining = stats.remaining,
            runtime_minutes = stats.runtime_minutes,
            "Scan finished"
        );

        if let Some(error) = fatal {
            if let Err(status_err) =
                self.record_status(RunState::Error, error.to_string(), Some(stats.clone()))
            {
                tracing::warn!(error = %status_err, "Failed to record run status");
            }
            return Ok(ScanOutcome::Failed { error, stats });
        }

        self.record_status(RunState::Completed, stats.summary(), Some(stats.clone()))?;
        state::set_json(
            self.state.as_ref(),
            keys::LAST_RUN,
            &LastRun {
                timestamp: self.clock.now(),
                stats: stats.clone(),
            },
            None,
        )?;
        Ok(ScanOutcome::Completed(stats))
    }

    /// A credential exists and the configured selection has a usable model.
    async fn preflight(&self) -> Result<()> {
        if !self.generator.has_credential() {
            return Err(Error::NoCredential);
        }

        if let Some(id) = self.config.model.pinned() {
            match self.catalog.find_model(id).await? {
                Some(model) if model.supports_vision => {
                    tracing::debug!(model = id, "Pinned model available");
                    return Ok(());
                }
                _ => tracing::warn!(model = id, "Pinned model unavailable, checking free models"),
            }
        }

        let models = self.catalog.vision_models(true, false).await?;
        match models.first() {
            Some(best) => {
                tracing::debug!(model = %best.id, "Preflight selected model");
                Ok(())
            }
            None => Err(Error::NoSuitableModels),
        }
    }

    /// Returns the counts gathered so far together with the error that ended
    /// the batch early, if any.
    async fn run_batch(&self, limit: BatchSize) -> (BatchStats, Option<Error>) {
        let started = self.clock.now();
        let mut stats = BatchStats::default();
        let fatal = self.walk_pages(limit, started, &mut stats).await.err();
        if let Some(error) = &fatal {
            tracing::error!(error = %error, processed = stats.processed, "Aborting scan");
            stats.last_error = Some(error.to_string());
        }
        stats.finish(elapsed_between(started, self.clock.now()));
        (stats, fatal)
    }

    async fn walk_pages(
        &self,
        limit: BatchSize,
        started: DateTime<Utc>,
        stats: &mut BatchStats,
    ) -> Result<()> {
        let budget = self.config.max_runtime();
        let (page_size, cap) = match limit {
            BatchSize::All => (SCAN_PAGE_SIZE, None),
            BatchSize::Count(n) => (n, Some(n)),
        };
        let seed = random_seed();

        let mut page = self.library.missing_alt_page(MissingAltQuery {
            seed,
            after: None,
            limit: page_size,
        })?;
        stats.found = page.total;
        tracing::info!(found = stats.found, "Images without alt text");

        loop {
            for image in &page.items {
                if let Some(budget) = budget
                    && elapsed_between(started, self.clock.now()) > budget
                {
                    tracing::warn!(budget_secs = budget.as_secs(), "Reached maximum runtime");
                    stats.budget_exhausted = true;
                    return Ok(());
                }
                if cap.is_some_and(|cap| stats.processed >= cap) {
                    return Ok(());
                }

                stats.processed += 1;
                match self.process_image(image).await? {
                    ItemOutcome::Generated => stats.generated += 1,
                    ItemOutcome::Skipped => stats.skipped += 1,
                    ItemOutcome::AlreadyProcessed => stats.already_processed += 1,
                    ItemOutcome::Failed(error) => {
                        stats.failed += 1;
                        if error.is_fatal_for_batch() {
                            return Err(error);
                        }
                        tracing::warn!(image = image.id, error = %error, "Generation failed");
                        stats.last_error = Some(error.to_string());
                    }
                }
            }

            let (None, Some(next)) = (cap, page.next) else {
                return Ok(());
            };
            page = self.library.missing_alt_page(MissingAltQuery {
                seed,
                after: Some(next),
                limit: page_size,
            })?;
        }
    }

    /// Per-item checks, generation, auto-apply and pacing. Only store
    /// failures while checking propagate; generation errors are returned as
    /// an outcome.
    async fn process_image(&self, image: &ImageItem) -> Result<ItemOutcome> {
        if self
            .suggestions
            .latest_for_image(image.id, SuggestionStatus::Pending)?
            .is_some()
        {
            tracing::debug!(image = image.id, "Skipping image with pending suggestion");
            return Ok(ItemOutcome::Skipped);
        }
        if self
            .suggestions
            .latest_for_image(image.id, SuggestionStatus::Applied)?
            .is_some()
        {
            tracing::debug!(image = image.id, "Skipping image with applied suggestion");
            return Ok(ItemOutcome::AlreadyProcessed);
        }

        // The page is a snapshot; alt text may have been set since.
        let Some(current) = self.library.get_image(image.id)? else {
            tracing::debug!(image = image.id, "Image disappeared during scan");
            return Ok(ItemOutcome::AlreadyProcessed);
        };
        if current.has_alt_text() {
            tracing::debug!(image = image.id, "Skipping image with existing alt text");
            return Ok(ItemOutcome::AlreadyProcessed);
        }

        let record = match self.generate_and_store(&current).await {
            Ok(record) => record,
            Err(e) => return Ok(ItemOutcome::Failed(e)),
        };

        if self.config.mode == OperationMode::Auto {
            match self.apply(record.id) {
                Ok(true) => {}
                Ok(false) => tracing::warn!(suggestion = record.id, "Auto-apply had no effect"),
                Err(e) => tracing::warn!(suggestion = record.id, error = %e, "Auto-apply failed"),
            }
        }

        let delay = self.config.request_delay();
        if !delay.is_zero() {
            tracing::debug!(delay_secs = delay.as_secs(), "Waiting before next request");
            self.clock.sleep(delay).await;
        }
        Ok(ItemOutcome::Generated)
    }

    fn record_status(
        &self,
        run_state: RunState,
        message: String,
        stats: Option<BatchStats>,
    ) -> Result<()> {
        let status = RunStatus {
            timestamp: self.clock.now(),
            state: run_state,
            message,
            stats,
        };
        state::set_json(self.state.as_ref(), keys::RUN_STATUS, &status, None)
    }
}
