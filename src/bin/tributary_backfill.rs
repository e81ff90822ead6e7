//! tributary-backfill: bulk (re)population of lineage projections
//!
//! Refreshes the projections of every run, newest first. Large histories
//! are refused unless `--manual` is given, so automatic upgrade paths never
//! start a multi-hour rebuild. Safe to interrupt (Ctrl-C stops after the
//! current chunk) and to re-run.

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tributary::backfill::{BackfillCoordinator, BackfillOutcome};
use tributary::config::Config;
use tributary::partition::PartitionManager;
use tributary::projection::ProjectionMaintainer;
use tributary::storage::init_storage;

#[derive(Debug, Parser)]
#[command(name = "tributary-backfill", about = "Rebuild lineage projections from run facts")]
struct Cli {
    /// Configuration file (YAML).
    #[arg(long, short)]
    config: Option<String>,

    /// Runs refreshed per chunk (defaults to `backfill.chunk_size`).
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Operator-initiated run: process everything regardless of size.
    #[arg(long)]
    manual: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tributary::utils::bootstrap::init_tracing();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let stores = init_storage(&config.storage).await?;
    let (cancel, cancelled) = watch::channel(false);
    let coordinator = BackfillCoordinator::new(
        &stores,
        ProjectionMaintainer::new(&stores, config.retry.clone()),
        PartitionManager::new(&stores, config.partitions.clone()),
        config.backfill.clone(),
    )
    .with_cancellation(cancelled);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current chunk");
            let _ = cancel.send(true);
        }
    });

    let chunk_size = cli
        .chunk_size
        .unwrap_or_else(|| coordinator.default_chunk_size());
    match coordinator.backfill(chunk_size, cli.manual).await? {
        BackfillOutcome::Completed(stats) => info!(
            processed = stats.processed,
            failed = stats.failed,
            elapsed_secs = stats.elapsed.as_secs(),
            "Backfill finished"
        ),
        BackfillOutcome::Refused {
            estimated_runs,
            threshold,
        } => info!(
            estimated_runs,
            threshold,
            "Backfill refused; re-run with --manual to proceed"
        ),
        BackfillOutcome::Cancelled(stats) => info!(
            processed = stats.processed,
            failed = stats.failed,
            "Backfill interrupted; re-run to finish"
        ),
    }
    Ok(())
}
