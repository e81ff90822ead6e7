//! tributary-maintenance: background partition maintenance
//!
//! Keeps the projection tables' monthly partitions ahead of incoming runs,
//! prunes months past retention and refreshes planner statistics.
//!
//! ## Configuration
//! - TRIBUTARY_CONFIG: YAML configuration file
//! - TRIBUTARY__PARTITIONS__LOOKAHEAD_MONTHS / RETENTION_MONTHS / INTERVAL_SECS
//! - TRIBUTARY_LOG: tracing filter (default `info`)

use clap::Parser;
use tracing::{error, info};

use tributary::config::Config;
use tributary::partition::{PartitionManager, PartitionScheduler};
use tributary::storage::init_storage;

#[derive(Debug, Parser)]
#[command(name = "tributary-maintenance", about = "Projection partition maintenance")]
struct Cli {
    /// Configuration file (YAML).
    #[arg(long, short)]
    config: Option<String>,

    /// Run a single maintenance pass and exit.
    #[arg(long)]
    once: bool,
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
    let manager = PartitionManager::new(&stores, config.partitions.clone());
    let scheduler = PartitionScheduler::new(manager, config.retry.clone());

    if cli.once {
        let report = scheduler.run_once().await?;
        info!(
            created = report.created.len(),
            dropped = report.dropped.len(),
            analyzed = report.analyzed,
            "Maintenance pass complete"
        );
        return Ok(());
    }

    info!(
        interval_secs = config.partitions.interval_secs,
        lookahead_months = config.partitions.lookahead_months,
        retention_months = ?config.partitions.retention_months,
        "Starting tributary-maintenance"
    );
    let handle = scheduler.spawn();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.stop().await;
    Ok(())
}
