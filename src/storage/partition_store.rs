//! PartitionStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{PartitionMonth, PartitionStats, ProjectionTable};

/// Physical partition management for the projection tables.
///
/// Create and drop are idempotent: creating an existing partition or
/// dropping a missing one succeeds and reports `false`.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Months that currently have a partition, ascending.
    async fn list_partitions(&self, table: ProjectionTable) -> Result<Vec<PartitionMonth>>;

    /// Create the month's partition. Returns whether it was newly created.
    async fn create_partition(&self, table: ProjectionTable, month: PartitionMonth) -> Result<bool>;

    /// Drop the month's partition with all its rows. Returns whether it existed.
    async fn drop_partition(&self, table: ProjectionTable, month: PartitionMonth) -> Result<bool>;

    /// Refresh planner statistics on the logical table.
    async fn analyze(&self, table: ProjectionTable) -> Result<()>;

    /// Per-partition size information, ascending by month.
    async fn partition_stats(&self, table: ProjectionTable) -> Result<Vec<PartitionStats>>;
}
