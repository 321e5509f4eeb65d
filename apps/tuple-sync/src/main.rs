//! tuple-sync - keeps the ReBAC tuple store in sync with legacy RBAC.
//!
//! Runs the reconciliation scheduler until SIGTERM/Ctrl+C, or a single pass
//! with `--once`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use xavyo_tuple_sync::legacy::{LegacySource, PgLegacySource};
use xavyo_tuple_sync::lock::{LockService, PgLeaseLock};
use xavyo_tuple_sync::store::{OpenFgaStore, TupleStore};
use xavyo_tuple_sync::{
    standard_reconcilers, ReconciliationScheduler, SchedulerConfig, SyncConfig, TickOutcome,
};

mod logging;

use logging::init_logging;

const STORE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reconcile legacy role assignments into the tuple store
#[derive(Parser)]
#[command(name = "tuple-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run a single reconciliation pass and exit
    #[arg(long)]
    once: bool,

    /// Log the changes each pass would make without writing them
    #[arg(long, env = "RECONCILE_DRY_RUN")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match SyncConfig::from_env() {
        Ok(config) => config.with_dry_run(cli.dry_run),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_filter);
    info!(
        store_url = %config.store_url,
        interval_secs = config.interval.as_secs(),
        batch_size = config.batch_size,
        dry_run = config.dry_run,
        once = cli.once,
        "Starting tuple-sync"
    );

    let pool = match PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            info!("Database connection established");
            pool
        }
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return ExitCode::FAILURE;
        }
    };

    let lock = PgLeaseLock::new(pool.clone());
    if let Err(e) = lock.ensure_schema().await {
        error!(error = %e, "Failed to create lock table");
        return ExitCode::FAILURE;
    }

    let store = match OpenFgaStore::new(
        &config.store_url,
        config.store_api_token.clone(),
        STORE_REQUEST_TIMEOUT,
    ) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to build tuple store client");
            return ExitCode::FAILURE;
        }
    };

    let source: Arc<dyn LegacySource> = Arc::new(PgLegacySource::new(pool));
    let store: Arc<dyn TupleStore> = Arc::new(store);
    let lock: Arc<dyn LockService> = Arc::new(lock);

    let reconcilers = standard_reconcilers(source.clone(), store, &config);
    let scheduler =
        ReconciliationScheduler::new(reconcilers, source, lock, SchedulerConfig::from(&config));

    if cli.once {
        return match scheduler.run_once().await {
            Ok(TickOutcome::Completed(report)) => {
                info!(
                    passes = report.passes,
                    writes = report.writes,
                    deletes = report.deletes,
                    orphans = report.orphans,
                    "Reconciliation pass completed"
                );
                ExitCode::SUCCESS
            }
            Ok(TickOutcome::Skipped) => {
                info!("Reconciliation lock held by another instance, nothing to do");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "Reconciliation pass failed");
                ExitCode::FAILURE
            }
        };
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    scheduler.run(shutdown).await;

    info!("tuple-sync stopped");
    ExitCode::SUCCESS
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
