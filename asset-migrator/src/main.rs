//! Asset Migrator - Main entry point
//!
//! Backs up a directory of photos to an HTTP endpoint and optionally deletes
//! the confirmed originals.

use anyhow::Result;
use asset_migrator::executor::state::StatusSnapshot;
use asset_migrator::shutdown::ShutdownCoordinator;
use asset_migrator::store::directory::WalkOptions;
use asset_migrator::transfer::progress::{format_bytes, format_duration, format_rate};
use asset_migrator::{
    utils, Config, DirectoryAssetStore, ExecutorOptions, HttpRemoteStore, MigrationEvent,
    MigrationExecutor,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// How often progress is logged while a run is active
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Assets to process in this run (overrides config)
    #[arg(short, long)]
    budget: Option<u64>,

    /// Attempts per asset, including the first (overrides config)
    #[arg(short, long)]
    max_attempts: Option<u32>,

    /// Directory to migrate (overrides config)
    #[arg(short, long, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Remote base URL (overrides config)
    #[arg(short, long, value_name = "URL")]
    remote: Option<String>,

    /// Delete backed-up originals after the run
    #[arg(short, long)]
    delete: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print events to stdout as JSON lines
    #[arg(long)]
    json: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(budget) = self.budget {
            config.run.budget = budget;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.run.max_attempts = max_attempts;
        }
        if let Some(source) = &self.source {
            config.source.root = source.clone();
        }
        if let Some(remote) = &self.remote {
            config.remote.base_url = remote.clone();
        }
        if self.delete {
            config.run.delete_after_backup = true;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    utils::logger::init(&config.log.level)?;

    tracing::info!(
        "Starting asset-migrator v{} ({} -> {})",
        env!("CARGO_PKG_VERSION"),
        config.source.root.display(),
        config.remote.base_url
    );

    let assets = Arc::new(DirectoryAssetStore::with_options(
        &config.source.root,
        WalkOptions::from(&config.source),
    ));
    let remote = Arc::new(HttpRemoteStore::with_timeouts(
        &config.remote.base_url,
        Duration::from_secs(config.remote.timeout_secs),
        Duration::from_secs(config.remote.connect_timeout_secs),
    )?);
    let executor = Arc::new(MigrationExecutor::new(
        assets,
        remote,
        ExecutorOptions::from(&config.run),
    ));

    let events_task = args
        .json
        .then(|| tokio::spawn(print_events(executor.subscribe_events())));

    let handle = executor.start(config.run.budget);

    // Cancel the run on SIGINT/SIGTERM
    let shutdown = ShutdownCoordinator::new(handle.cancellation_token());
    let signal_task = tokio::spawn(async move { shutdown.wait_for_signal().await });
    let reporter = tokio::spawn(report_progress(handle.status()));

    let result = handle.wait().await;
    reporter.abort();
    signal_task.abort();
    let summary = result?;

    tracing::info!(
        "Run {} complete: {} backed up ({} uploaded, {} present, {}), {} failed, {} retries in {}",
        summary.run_id,
        summary.backup_completed,
        summary.uploaded,
        summary.already_present,
        format_bytes(summary.bytes_uploaded),
        summary.failed.len(),
        summary.retries,
        format_duration(summary.duration_secs as u64)
    );
    for failure in &summary.failed {
        tracing::warn!(
            "Not backed up: {} after {} attempt(s): {}",
            failure.filename,
            failure.attempts,
            failure.error
        );
    }

    if summary.cancelled {
        tracing::warn!(
            "Run cancelled with {} of budget left, skipping deletion",
            summary.budget_remaining
        );
    } else if config.run.delete_after_backup {
        match executor.flush().await {
            Ok(deleted) => tracing::info!("Deleted {} backed-up original(s)", deleted),
            Err(e) => tracing::error!(
                "Deletion failed, {} asset(s) left in place: {}",
                executor.deletion_queue().len(),
                e
            ),
        }
    }

    // Closing the event channel lets the printer drain and exit
    drop(executor);
    if let Some(task) = events_task {
        let _ = task.await;
    }

    Ok(())
}

async fn report_progress(status: watch::Receiver<StatusSnapshot>) {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let snapshot = status.borrow().clone();
        if !snapshot.running {
            continue;
        }
        tracing::info!(
            "Progress: {} backed up, {} failed, {} budget left, rate {}, ETA {}",
            snapshot.backup_completed,
            snapshot.failed,
            snapshot.budget_remaining,
            format_rate(snapshot.operations_per_minute),
            snapshot
                .eta_seconds
                .map(format_duration)
                .unwrap_or_else(|| "-".to_string())
        );
    }
}

async fn print_events(mut events: broadcast::Receiver<MigrationEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event output lagged, {} event(s) dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
