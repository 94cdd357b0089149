use altgen::cli::{self, Cli};
use clap::Parser;
use std::process::ExitCode;

/// Log file path when set; otherwise `RUST_LOG` controls stderr output.
const LOG_ENV: &str = "ALTGEN_LOG";

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    if let Ok(path) = std::env::var(LOG_ENV) {
        match std::fs::File::create(&path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = EnvFilter::new("altgen=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
                return;
            }
            Err(err) => eprintln!("Failed to create log file {path}: {err}"),
        }
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("warn")
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    cli::run(cli).await
}
