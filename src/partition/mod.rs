//! Partition lifecycle management.
//!
//! Both projection tables are range-partitioned by calendar month of the
//! row's run date. The manager keeps a lookahead window of future months
//! in place, prunes months past retention and refreshes planner
//! statistics on the logical tables.
//!
//! Creation and removal are idempotent. The current and future months are
//! never dropped, whatever the retention setting.

mod scheduler;

pub use scheduler::{PartitionScheduler, SchedulerHandle};

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::config::PartitionConfig;
use crate::model::{PartitionMonth, PartitionStats, ProjectionTable};
use crate::storage::{PartitionStore, StorageError, Stores};

/// Errors from partition maintenance.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PartitionError {
    pub fn is_transient(&self) -> bool {
        let PartitionError::Storage(e) = self;
        e.is_transient()
    }
}

/// What one maintenance pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Partitions created, by physical name.
    pub created: Vec<String>,
    /// Partitions dropped, by physical name.
    pub dropped: Vec<String>,
    /// Whether statistics were refreshed.
    pub analyzed: bool,
}

impl MaintenanceReport {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.dropped.is_empty()
    }
}

/// Creates, retires and inspects monthly projection partitions.
#[derive(Clone)]
pub struct PartitionManager {
    partitions: Arc<dyn PartitionStore>,
    config: PartitionConfig,
}

impl PartitionManager {
    pub fn new(stores: &Stores, config: PartitionConfig) -> Self {
        Self {
            partitions: stores.partitions.clone(),
            config,
        }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Make sure the month containing `date` has a partition in both tables.
    ///
    /// Returns the names of partitions this call created. A partition
    /// created concurrently by someone else counts as present.
    pub async fn ensure_partition(&self, date: NaiveDate) -> Result<Vec<String>, PartitionError> {
        self.ensure_month(PartitionMonth::of(date)).await
    }

    pub async fn ensure_month(&self, month: PartitionMonth) -> Result<Vec<String>, PartitionError> {
        let mut created = Vec::new();
        for table in ProjectionTable::ALL {
            if self.partitions.list_partitions(table).await?.contains(&month) {
                continue;
            }
            let name = month.partition_name(table);
            if self.partitions.create_partition(table, month).await? {
                info!(partition = %name, %month, "Created partition");
                created.push(name);
            } else {
                debug!(partition = %name, "Partition created concurrently");
            }
        }
        Ok(created)
    }

    /// Ensure partitions for `month(start)` through `month(start) + count`.
    pub async fn create_partitions_for_period(
        &self,
        start: NaiveDate,
        count: u32,
    ) -> Result<Vec<String>, PartitionError> {
        let first = PartitionMonth::of(start);
        let mut created = Vec::new();
        for offset in 0..=count {
            created.extend(self.ensure_month(first.plus_months(i64::from(offset))).await?);
        }
        Ok(created)
    }

    /// Drop partitions older than `retention_months` before the current month.
    pub async fn cleanup_old_partitions(
        &self,
        retention_months: u32,
    ) -> Result<Vec<String>, PartitionError> {
        self.cleanup_old_partitions_as_of(Utc::now().date_naive(), retention_months)
            .await
    }

    /// Drop every partition strictly before `month(today) - retention_months`.
    pub async fn cleanup_old_partitions_as_of(
        &self,
        today: NaiveDate,
        retention_months: u32,
    ) -> Result<Vec<String>, PartitionError> {
        let current = PartitionMonth::of(today);
        let cutoff = current.plus_months(-i64::from(retention_months));
        let mut dropped = Vec::new();
        for table in ProjectionTable::ALL {
            for month in self.partitions.list_partitions(table).await? {
                if month >= cutoff || month >= current {
                    continue;
                }
                let name = month.partition_name(table);
                if self.partitions.drop_partition(table, month).await? {
                    info!(partition = %name, %month, %cutoff, "Dropped partition past retention");
                    dropped.push(name);
                }
            }
        }
        Ok(dropped)
    }

    /// Refresh planner statistics on both logical tables.
    pub async fn analyze(&self) -> Result<(), PartitionError> {
        for table in ProjectionTable::ALL {
            self.partitions.analyze(table).await?;
            debug!(%table, "Analyzed table");
        }
        Ok(())
    }

    /// Row estimate and size of every partition, run table first.
    pub async fn stats(&self) -> Result<Vec<PartitionStats>, PartitionError> {
        let mut stats = Vec::new();
        for table in ProjectionTable::ALL {
            stats.extend(self.partitions.partition_stats(table).await?);
        }
        Ok(stats)
    }

    /// One full pass: lookahead, retention, then statistics if anything changed.
    pub async fn run_maintenance(
        &self,
        today: NaiveDate,
    ) -> Result<MaintenanceReport, PartitionError> {
        let mut report = MaintenanceReport {
            created: self
                .create_partitions_for_period(today, self.config.lookahead_months)
                .await?,
            ..Default::default()
        };

        if let Some(retention) = self.config.retention_months {
            report.dropped = self.cleanup_old_partitions_as_of(today, retention).await?;
        }

        if report.changed() && self.config.analyze_after_maintenance {
            self.analyze().await?;
            report.analyzed = true;
        }
        Ok(report)
    }
}
