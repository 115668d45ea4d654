use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jobvault::core::{Orchestrator, notifications};
use jobvault::{capture, config, logging, store};

#[derive(Parser)]
#[command(name = "jobvault")]
#[command(about = "Snapshot backups of scheduled-job configuration", long_about = None)]
struct Cli {
    /// Path to the configuration file
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Any configuration problem is fatal here, before a single target is
    // touched; a completed run exits 0 even when it recorded errors.
    let config = config::AppConfig::load(cli.config.as_deref())?;

    logging::init(logging::LogConfig {
        json: cli.json_logs,
        verbose: cli.verbose,
        file: config.log_file.clone(),
    })
    .context("Failed to initialize logging")?;

    let store = store::open(&config).context("Failed to open object store")?;
    let capturer = capture::create_capturer(&config)?;
    let notifier = notifications::create_notifier(&config)?;

    let orchestrator = Orchestrator::new(Arc::new(config), store, capturer, notifier);
    let today = chrono::Local::now().date_naive();
    orchestrator.run(today).await;

    Ok(())
}
