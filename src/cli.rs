//! Command-line surface over [`AltTextService`].

use crate::clock::{Clock, SystemClock};
use crate::config::{BatchSize, Config};
use crate::media::NewImage;
use crate::provider::OpenRouterClient;
use crate::service::{AltTextService, BatchStats, ScanOutcome, format_elapsed};
use crate::store::SqliteStore;
use crate::suggestion::{SuggestionRecord, SuggestionStatus};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Alt text generation for image libraries using `OpenRouter` vision models
#[derive(Parser, Debug)]
#[command(name = "altgen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate suggestions for images lacking alt text
    Scan {
        /// Number of images, or "all" (defaults to batch_size from config)
        #[arg(long)]
        limit: Option<BatchSize>,
    },
    /// Generate a suggestion for one image
    Generate {
        #[arg(value_name = "IMAGE_ID")]
        image_id: i64,
    },
    /// Write a pending suggestion onto its image
    Apply { id: i64 },
    /// Reject a pending suggestion
    Reject { id: i64 },
    /// Show one suggestion with its request, response, model and timing
    Show { id: i64 },
    /// Suggestion totals per status
    Counts,
    /// List suggestions, newest first
    List {
        #[arg(long)]
        status: Option<SuggestionStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Recent generated, applied and rejected events
    Activity {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Usable vision models, best first
    Models {
        /// List paid models instead of free ones
        #[arg(long)]
        paid: bool,
        /// Refetch the catalog first
        #[arg(long)]
        refresh: bool,
    },
    /// Refetch the catalog and clear exhausted models
    RefreshModels,
    /// Latest scan status and last completed run
    Status,
    /// Manage the local image library
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImageAction {
    /// Register an image
    Add {
        url: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        caption: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Existing alt text
        #[arg(long, default_value = "")]
        alt: String,
        #[arg(long, default_value = "image/jpeg")]
        mime: String,
    },
    /// List registered images
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

#[derive(Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
enum ScanReport<'a> {
    Skipped { running_since: String },
    Completed { stats: &'a BatchStats },
    Failed { error: String, stats: &'a BatchStats },
}

struct App {
    service: AltTextService,
    store: Arc<SqliteStore>,
    json: bool,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(
            SqliteStore::open(&config.db_path(), clock.clone())
                .with_context(|| format!("Failed to open {}", config.db_path().display()))?,
        );
        let api = Arc::new(OpenRouterClient::new(
            config.api_key(),
            &config.base_url,
            config.http_referer.as_deref(),
            &config.app_title,
        ));
        let service = AltTextService::new(
            config,
            api,
            store.clone(),
            store.clone(),
            store.clone(),
            clock,
        );
        Ok(Self {
            service,
            store,
            json: cli.json,
        })
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

/// Run one subcommand.
pub async fn run(cli: Cli) -> ExitCode {
    match run_inner(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run_inner(cli: Cli) -> Result<ExitCode> {
    let app = App::open(&cli)?;

    match cli.command {
        Commands::Scan { limit } => return scan(&app, limit).await,
        Commands::Generate { image_id } => {
            let record = app
                .service
                .generate_for_image(image_id)
                .await
                .with_context(|| format!("Generation failed for image {image_id}"))?;
            app.emit(&record, || {
                format!(
                    "#{} image {} [{}] {:.1}s\n{}",
                    record.id, record.image_id, record.model, record.duration_secs, record.alt_text
                )
            })?;
        }
        Commands::Apply { id } => {
            let applied = app.service.apply(id)?;
            app.emit(&applied, || resolution_message(id, applied, "Applied"))?;
            if !applied {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Reject { id } => {
            let rejected = app.service.reject(id)?;
            app.emit(&rejected, || resolution_message(id, rejected, "Rejected"))?;
            if !rejected {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Show { id } => {
            let record = app.service.suggestion(id)?;
            app.emit(&record, || describe_suggestion(&record))?;
        }
        Commands::Counts => {
            let counts = app.service.counts()?;
            app.emit(&counts, || {
                format!(
                    "pending: {}\napplied: {}\nrejected: {}\ntotal: {}",
                    counts.pending, counts.applied, counts.rejected, counts.total
                )
            })?;
        }
        Commands::List {
            status,
            limit,
            offset,
        } => {
            let records = app.service.list(status, limit, offset)?;
            app.emit(&records, || {
                records
                    .iter()
                    .map(|r| {
                        format!(
                            "#{:<5} image {:<5} {:<8} {}  {}",
                            r.id,
                            r.image_id,
                            r.status,
                            r.created_at.format("%Y-%m-%d %H:%M"),
                            r.alt_text
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::Activity { limit } => {
            let entries = app.service.activity(limit)?;
            app.emit(&entries, || {
                entries
                    .iter()
                    .map(|e| {
                        let model = e.model.as_deref().map(|m| format!(" [{m}]")).unwrap_or_default();
                        format!(
                            "{}  {:<9} {}{}: {}",
                            e.at.format("%Y-%m-%d %H:%M"),
                            e.kind,
                            e.image_title,
                            model,
                            e.alt_text
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::Models { paid, refresh } => {
            let models = app.service.vision_models(!paid, refresh).await?;
            app.emit(&models, || {
                if models.is_empty() {
                    return "No usable vision models".to_string();
                }
                models
                    .iter()
                    .map(|m| format!("{:<56} {:>9}  {}", m.id, m.context_length, m.name))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::RefreshModels => {
            let models = app.service.refresh_models().await?;
            app.emit(&models.len(), || format!("Fetched {} models", models.len()))?;
        }
        Commands::Status => status(&app)?,
        Commands::Image { action } => image(&app, action)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Full provenance of one suggestion. JSON bodies are pretty-printed.
fn describe_suggestion(record: &SuggestionRecord) -> String {
    let pretty = |raw: &str| {
        serde_json::from_str::<serde_json::Value>(raw)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| raw.to_string())
    };
    let applied = record
        .applied_at
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "suggestion: #{}\nimage: {}\nstatus: {}\nmodel: {}\ncreated: {}\nresolved: {}\n\
         duration: {:.2}s\nalt text: {}\n\nrequest:\n{}\n\nresponse:\n{}",
        record.id,
        record.image_id,
        record.status,
        record.model,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        applied,
        record.duration_secs,
        record.alt_text,
        pretty(&record.request_payload),
        pretty(&record.response_body),
    )
}

fn resolution_message(id: i64, done: bool, verb: &str) -> String {
    if done {
        format!("{verb} suggestion #{id}")
    } else {
        format!("Suggestion #{id} is missing or not pending")
    }
}

async fn scan(app: &App, limit: Option<BatchSize>) -> Result<ExitCode> {
    let limit = limit.unwrap_or(app.service.config().batch_size);
    let outcome = app.service.scan(limit).await.context("Scan failed")?;

    let (report, code) = match &outcome {
        ScanOutcome::Skipped { running_since } => (
            ScanReport::Skipped {
                running_since: running_since.to_rfc3339(),
            },
            ExitCode::SUCCESS,
        ),
        ScanOutcome::Completed(stats) => (ScanReport::Completed { stats }, ExitCode::SUCCESS),
        ScanOutcome::Failed { error, stats } => (
            ScanReport::Failed {
                error: error.to_string(),
                stats,
            },
            ExitCode::from(1),
        ),
    };

    app.emit(&report, || match &outcome {
        ScanOutcome::Skipped { running_since } => {
            format!("Another scan is running (started {running_since})")
        }
        ScanOutcome::Completed(stats) => describe_stats(stats),
        ScanOutcome::Failed { error, stats } => {
            format!("Scan failed: {error}\n{}", describe_stats(stats))
        }
    })?;
    Ok(code)
}

fn describe_stats(stats: &BatchStats) -> String {
    let mut out = format!(
        "{}\nskipped: {}  already processed: {}  failed: {}  remaining: {}  runtime: {:.1}m",
        stats.summary(),
        stats.skipped,
        stats.already_processed,
        stats.failed,
        stats.remaining,
        stats.runtime_minutes
    );
    if stats.budget_exhausted {
        out.push_str("\nStopped early: maximum runtime reached");
    }
    if let Some(error) = &stats.last_error {
        out.push_str(&format!("\nlast error: {error}"));
    }
    out
}

fn status(app: &App) -> Result<()> {
    let run_status = app.service.run_status()?;
    let last_run = app.service.last_run()?;
    let last_attempt = app.service.last_attempt()?;
    let counts = app.service.counts()?;

    let report = serde_json::json!({
        "run_status": run_status,
        "last_run": last_run,
        "last_attempt": last_attempt,
        "counts": counts,
    });
    app.emit(&report, || {
        let now = chrono::Utc::now();
        let mut lines = Vec::new();
        match &run_status {
            Some(s) => lines.push(format!(
                "status: {} ({} ago) {}",
                s.state,
                format_elapsed((now - s.timestamp).to_std().unwrap_or_default()),
                s.message
            )),
            None => lines.push("status: never run".to_string()),
        }
        if let Some(run) = &last_run {
            lines.push(format!(
                "last completed: {} {}",
                run.timestamp.format("%Y-%m-%d %H:%M"),
                run.stats.summary()
            ));
        }
        if let Some(at) = last_attempt {
            lines.push(format!("last attempt: {}", at.format("%Y-%m-%d %H:%M")));
        }
        lines.push(format!(
            "suggestions: {} pending, {} applied, {} rejected",
            counts.pending, counts.applied, counts.rejected
        ));
        lines.join("\n")
    })
}

fn image(app: &App, action: ImageAction) -> Result<()> {
    match action {
        ImageAction::Add {
            url,
            title,
            caption,
            description,
            alt,
            mime,
        } => {
            let id = app.store.add_image(&NewImage {
                url,
                mime_type: mime,
                title,
                caption,
                description,
                alt_text: alt,
            })?;
            app.emit(&id, || format!("Added image {id}"))
        }
        ImageAction::List { limit, offset } => {
            let images = app.store.list_images(limit, offset)?;
            app.emit(&images, || {
                images
                    .iter()
                    .map(|i| {
                        let alt = if i.has_alt_text() { i.alt_text.as_str() } else { "(no alt text)" };
                        format!("{:<5} {:<40} {}", i.id, i.url, alt)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}
