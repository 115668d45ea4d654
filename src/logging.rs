//! Logging and tracing initialization.
//!
//! Structured logging via the `tracing` ecosystem: pretty console output by
//! default, JSON for machine parsing, and an optional plain-text run-log
//! file. The run-log file is what the notifier attaches to the end-of-run
//! report.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration for the logging system.
#[derive(Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
    /// Also write a plain-text run log to this file
    pub file: Option<PathBuf>,
}

/// Initialize the tracing subscriber with the given configuration.
///
/// This should be called early in main(), after config is loaded.
/// The log level can be overridden at runtime via the `RUST_LOG` environment
/// variable.
pub fn init(config: LogConfig) -> std::io::Result<()> {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("jobvault={}", default_level.as_str().to_lowercase()))
    });

    // The run log is truncated at startup so each run's attachment covers
    // exactly one run.
    let file_layer = match &config.file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(file_layer)
            .init();
    }

    Ok(())
}
