//! Tracekeeper daemon.
//!
//! Opens the partitioned store (creating the database and base schema on
//! first run) and drives the retention job, either once or on its
//! configured interval until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracekeeper::config::{self, ObsConfig};
use tracekeeper::lifecycle::{self, Shutdown};
use tracekeeper::retention::{RetentionJob, RetentionMode};
use tracekeeper::store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "tracekeeper", about = "Observability store and retention daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tracekeeper.toml")]
    config: PathBuf,

    /// Run one retention pass and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Report expired partitions without dropping them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tracekeeper={}", config.logging.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        db_path = %config.store.db_path,
        retention_enabled = config.retention.enabled,
        analytics_enabled = config.analytics.enabled,
        "tracekeeper starting"
    );

    // Opening the store applies pragmas and the base schema, so a bad
    // db_path fails here rather than inside the retention loop.
    let store = match SqliteStore::open(&config.store.db_path, config.store.writer_queue_depth) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let mut retention = config.retention.clone();
    if args.dry_run {
        retention.dry_run = true;
    }
    let job = RetentionJob::new(&config.store.db_path, retention);

    if args.once {
        let mode = if args.dry_run || config.retention.dry_run {
            RetentionMode::DryRun
        } else {
            RetentionMode::Execute
        };
        match job.run_once(mode) {
            Ok(report) => {
                tracing::info!(
                    partitions = report.total_partitions(),
                    rows = report.total_rows(),
                    dropped = report.total_dropped(),
                    "retention pass complete"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "retention pass failed");
                return ExitCode::FAILURE;
            }
        }
        store.close();
        return ExitCode::SUCCESS;
    }

    let shutdown = Shutdown::new();
    let job_handle = tokio::spawn(job.run(shutdown.subscribe()));

    lifecycle::wait_for_interrupt().await;
    tracing::info!("interrupt received, shutting down");
    shutdown.trigger();

    if job_handle.await.is_err() {
        tracing::error!("retention task panicked");
    }

    if let Err(e) = store.flush().await {
        tracing::warn!(error = %e, "final flush failed");
    }
    store.close();

    tracing::info!("shutdown complete");
    ExitCode::SUCCESS
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_or_default(path: &std::path::Path) -> Result<ObsConfig, config::ConfigError> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(ObsConfig::default())
    }
}
