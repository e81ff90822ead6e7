//! FactStore trait definition.

use async_trait::async_trait;
use uuid::Uuid;

use super::Result;
use crate::model::{
    DatasetRecord, DatasetVersionRecord, JobDatasetEdge, JobRecord, RunKey, RunRecord, VersionRef,
};

/// Read access to the authoritative fact tables.
///
/// Lookups of absent entities return `Ok(None)` or an empty list; not-found
/// is decided by callers, never signalled as an error here.
///
/// Implementations:
/// - `PostgresStore`: PostgreSQL fact tables written by the ingestion layer
/// - `MemoryStore`: in-memory tables for tests and local development
#[async_trait]
pub trait FactStore: Send + Sync {
    async fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>>;

    /// Whether any run names `run_id` as its parent.
    async fn has_children(&self, run_id: Uuid) -> Result<bool>;

    /// Dataset versions consumed by the run.
    async fn run_inputs(&self, run_id: Uuid) -> Result<Vec<VersionRef>>;

    /// Dataset versions produced by the run.
    async fn run_outputs(&self, run_id: Uuid) -> Result<Vec<VersionRef>>;

    async fn find_dataset_version(
        &self,
        namespace: &str,
        name: &str,
        version: Uuid,
    ) -> Result<Option<DatasetVersionRecord>>;

    async fn find_job(&self, namespace: &str, name: &str) -> Result<Option<JobRecord>>;

    async fn find_dataset(&self, namespace: &str, name: &str) -> Result<Option<DatasetRecord>>;

    async fn jobs_by_id(&self, ids: &[Uuid]) -> Result<Vec<JobRecord>>;

    async fn datasets_by_id(&self, ids: &[Uuid]) -> Result<Vec<DatasetRecord>>;

    /// Job↔Dataset edges touching any of the given jobs.
    async fn edges_for_jobs(&self, job_ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>>;

    /// Job↔Dataset edges touching any of the given datasets.
    async fn edges_for_datasets(&self, dataset_ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>>;

    /// Most recently created run of each job that has one.
    async fn latest_runs(&self, job_ids: &[Uuid]) -> Result<Vec<RunRecord>>;

    /// Statistics-based run count; `None` when statistics are unavailable.
    async fn estimate_run_count(&self) -> Result<Option<u64>>;

    /// Exact run count.
    async fn count_runs(&self) -> Result<u64>;

    /// Next page of run keys in (created_at DESC, id DESC) order, strictly
    /// after `cursor` when given.
    async fn run_keys_page(&self, cursor: Option<&RunKey>, limit: usize) -> Result<Vec<RunKey>>;
}
