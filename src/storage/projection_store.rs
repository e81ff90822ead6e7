//! ProjectionStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Result;
use crate::model::{ProjectionRow, ProjectionTable};

/// A parent's own direct rows, rebuilt alongside a child's refresh so the
/// aggregate view does not depend on refresh order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentContribution {
    pub parent_id: Uuid,
    /// Parent's `updated_at` the rows were computed from.
    pub observed_updated_at: DateTime<Utc>,
    pub rows: Vec<ProjectionRow>,
}

/// Complete replacement of one run's projection rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionRefresh {
    pub run_id: Uuid,
    /// Run's `updated_at` the rows were computed from.
    pub observed_updated_at: DateTime<Utc>,
    /// Rows for the run table, all with `run_id` = `self.run_id`.
    pub run_rows: Vec<ProjectionRow>,
    /// Rows for the run-parent table, all with `run_id` = `self.run_id`.
    pub parent_rows: Vec<ProjectionRow>,
    pub parent_contribution: Option<ParentContribution>,
}

/// Transactional writes and indexed reads of the projection tables.
///
/// Implementations:
/// - `PostgresStore`: range-partitioned PostgreSQL tables
/// - `MemoryStore`: in-memory tables that enforce the same partition rules
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Atomically replace the run's projection rows.
    ///
    /// In one transaction:
    /// 1. Fail with `RefreshConflict` if the run's (or contributing
    ///    parent's) `updated_at` differs from the observed value.
    /// 2. Delete every row whose `run_id` is the refreshed run, in both tables.
    /// 3. Insert `run_rows` and `parent_rows`.
    /// 4. For a parent contribution, delete the parent's own run-parent rows
    ///    and insert the supplied ones.
    ///
    /// Fails with `NoPartition` if any row's run date has no partition.
    /// On any failure, prior projection state is left intact.
    async fn apply_refresh(&self, refresh: ProjectionRefresh) -> Result<()>;

    /// Rows keyed by any of `keys` (run id, or parent id for run-parent).
    async fn rows_for_keys(&self, table: ProjectionTable, keys: &[Uuid])
        -> Result<Vec<ProjectionRow>>;

    /// Rows whose input version is any of `version_ids`.
    async fn rows_consuming(
        &self,
        table: ProjectionTable,
        version_ids: &[Uuid],
    ) -> Result<Vec<ProjectionRow>>;

    /// Rows whose output version is any of `version_ids`.
    async fn rows_producing(
        &self,
        table: ProjectionTable,
        version_ids: &[Uuid],
    ) -> Result<Vec<ProjectionRow>>;
}
