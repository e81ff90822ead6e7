//! Bulk (re)population of the projection tables.
//!
//! A backfill refreshes every run, newest first, in fixed-size chunks read
//! by keyset pagination. Each refresh replaces the run's rows wholesale,
//! so an interrupted backfill is repaired by running it again.
//!
//! Automatic runs over more runs than `backfill.large_dataset_threshold`
//! are refused without touching any data; operators start those by hand.

mod progress;

pub use progress::Progress;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::BackfillConfig;
use crate::model::{PartitionMonth, RunKey};
use crate::partition::{PartitionError, PartitionManager};
use crate::projection::{ProjectionError, ProjectionMaintainer};
use crate::storage::{FactStore, StorageError, Stores};
use progress::ProgressReporter;

/// Errors that stop a backfill. Per-run refresh failures are counted instead.
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<PartitionError> for BackfillError {
    fn from(err: PartitionError) -> Self {
        let PartitionError::Storage(e) = err;
        BackfillError::Storage(e)
    }
}

/// Counts for a finished or interrupted backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    /// Runs refreshed successfully.
    pub processed: u64,
    /// Runs whose refresh failed.
    pub failed: u64,
    pub elapsed: Duration,
}

/// How a backfill ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    Completed(BackfillStats),
    /// Too many runs for an automatic backfill; nothing was written.
    Refused { estimated_runs: u64, threshold: u64 },
    /// Stopped between chunks on request.
    Cancelled(BackfillStats),
}

/// Drives chunked projection refreshes over all runs.
pub struct BackfillCoordinator {
    facts: Arc<dyn FactStore>,
    maintainer: ProjectionMaintainer,
    partitions: PartitionManager,
    config: BackfillConfig,
    cancel: Option<watch::Receiver<bool>>,
}

impl BackfillCoordinator {
    pub fn new(
        stores: &Stores,
        maintainer: ProjectionMaintainer,
        partitions: PartitionManager,
        config: BackfillConfig,
    ) -> Self {
        Self {
            facts: stores.facts.clone(),
            maintainer,
            partitions,
            config,
            cancel: None,
        }
    }

    /// Stop between chunks once `cancel` reads `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Chunk size from configuration.
    pub fn default_chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Refresh the projections of every run.
    ///
    /// Without `manual`, a run count estimated above the configured
    /// threshold is refused. A chunk size of zero uses the configured one.
    pub async fn backfill(
        &self,
        chunk_size: usize,
        manual: bool,
    ) -> Result<BackfillOutcome, BackfillError> {
        let chunk_size = if chunk_size == 0 {
            self.config.chunk_size.max(1)
        } else {
            chunk_size
        };

        let estimated_runs = self.estimate_runs().await?;
        if estimated_runs == 0 {
            info!("No runs to backfill");
            return Ok(BackfillOutcome::Completed(BackfillStats::default()));
        }

        let threshold = self.config.large_dataset_threshold;
        if estimated_runs > threshold && !manual {
            warn!(
                estimated_runs,
                threshold,
                "Skipping automatic backfill of a large run history; run \
                 `tributary-backfill --manual` during a maintenance window \
                 to populate lineage projections"
            );
            return Ok(BackfillOutcome::Refused {
                estimated_runs,
                threshold,
            });
        }

        info!(estimated_runs, chunk_size, manual, "Starting backfill");
        let mut reporter = ProgressReporter::new(
            estimated_runs,
            Duration::from_secs(self.config.progress_interval_secs),
        );
        let mut processed = 0u64;
        let mut failed = 0u64;
        let mut cursor: Option<RunKey> = None;

        loop {
            if self.is_cancelled() {
                info!(processed, failed, "Backfill cancelled");
                self.refresh_statistics(processed).await;
                let stats = self.stats(&reporter, processed, failed);
                return Ok(BackfillOutcome::Cancelled(stats));
            }

            let chunk = self.facts.run_keys_page(cursor.as_ref(), chunk_size).await?;
            let Some(last) = chunk.last().cloned() else {
                break;
            };

            self.ensure_partitions(&chunk).await?;

            for key in &chunk {
                match self.refresh(key).await {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        failed += 1;
                        warn!(run_id = %key.id, error = %e, "Backfill refresh failed; continuing");
                    }
                }
            }

            reporter.maybe_report(processed, failed);
            cursor = Some(last);
        }

        self.refresh_statistics(processed).await;
        let stats = self.stats(&reporter, processed, failed);
        info!(
            processed,
            failed,
            elapsed_secs = stats.elapsed.as_secs(),
            "Backfill complete"
        );
        Ok(BackfillOutcome::Completed(stats))
    }

    /// Refresh one run. A parent rebuilt alongside may live in a month the
    /// chunk did not cover; that partition is created and the refresh retried once.
    async fn refresh(&self, key: &RunKey) -> Result<(), ProjectionError> {
        match self.maintainer.refresh(key.id).await {
            Ok(_) => Ok(()),
            Err(ProjectionError::Storage(StorageError::NoPartition { run_date, .. })) => {
                self.partitions
                    .ensure_partition(run_date)
                    .await
                    .map_err(|PartitionError::Storage(e)| ProjectionError::Storage(e))?;
                self.maintainer.refresh(key.id).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Planner statistics after a bulk write. A failure only costs plan
    /// quality until the next maintenance pass, so it is logged.
    async fn refresh_statistics(&self, processed: u64) {
        if processed == 0 {
            return;
        }
        if let Err(e) = self.partitions.analyze().await {
            warn!(error = %e, "Analyze after backfill failed");
        }
    }

    async fn estimate_runs(&self) -> Result<u64, BackfillError> {
        match self.facts.estimate_run_count().await? {
            Some(estimate) => Ok(estimate),
            None => Ok(self.facts.count_runs().await?),
        }
    }

    /// Partitions for every month the chunk's rows will land in.
    async fn ensure_partitions(&self, chunk: &[RunKey]) -> Result<(), BackfillError> {
        let months: BTreeSet<PartitionMonth> =
            chunk.iter().map(|k| PartitionMonth::of(k.run_date())).collect();
        for month in months {
            self.partitions.ensure_month(month).await?;
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn stats(&self, reporter: &ProgressReporter, processed: u64, failed: u64) -> BackfillStats {
        BackfillStats {
            processed,
            failed,
            elapsed: reporter.elapsed(),
        }
    }
}
