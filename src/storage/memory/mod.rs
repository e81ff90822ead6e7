//! In-memory storage backend.
//!
//! Holds fact and projection tables behind one lock, so a refresh is atomic
//! the same way a database transaction is. Partition rules match the
//! PostgreSQL backend: a row whose month has no partition is rejected.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    FactStore, PartitionStore, ProjectionRefresh, ProjectionStore, Result, StorageError,
};
use crate::model::{
    DatasetRecord, DatasetVersionRecord, EdgeDirection, JobDatasetEdge, JobRecord, PartitionMonth,
    PartitionStats, ProjectionRow, ProjectionTable, RunKey, RunRecord, VersionRef,
};

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, JobRecord>,
    datasets: HashMap<Uuid, DatasetRecord>,
    versions: HashMap<Uuid, DatasetVersionRecord>,
    runs: HashMap<Uuid, RunRecord>,
    /// run id → consumed version ids, in insertion order.
    inputs: HashMap<Uuid, Vec<Uuid>>,
    partitions: HashMap<ProjectionTable, BTreeSet<PartitionMonth>>,
    rows: HashMap<ProjectionTable, Vec<ProjectionRow>>,
    analyze_counts: HashMap<ProjectionTable, usize>,
}

impl Tables {
    fn run_outputs(&self, run_id: Uuid) -> Vec<VersionRef> {
        let mut outputs: Vec<VersionRef> = self
            .versions
            .values()
            .filter(|v| v.producing_run_id == Some(run_id))
            .map(DatasetVersionRecord::to_ref)
            .collect();
        outputs.sort();
        outputs
    }

    fn run_inputs(&self, run_id: Uuid) -> Vec<VersionRef> {
        self.inputs
            .get(&run_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.versions.get(id))
                    .map(DatasetVersionRecord::to_ref)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Job↔Dataset edges derived from every run's inputs and outputs.
    fn job_edges(&self) -> BTreeSet<JobDatasetEdge> {
        let mut edges = BTreeSet::new();
        for run in self.runs.values() {
            for input in self.run_inputs(run.id) {
                if let Some(version) = self.versions.get(&input.id) {
                    edges.insert(JobDatasetEdge {
                        job_id: run.job_id,
                        dataset_id: version.dataset_id,
                        direction: EdgeDirection::Input,
                    });
                }
            }
        }
        for version in self.versions.values() {
            let Some(run) = version.producing_run_id.and_then(|id| self.runs.get(&id)) else {
                continue;
            };
            edges.insert(JobDatasetEdge {
                job_id: run.job_id,
                dataset_id: version.dataset_id,
                direction: EdgeDirection::Output,
            });
        }
        edges
    }

    fn check_partitions(&self, table: ProjectionTable, rows: &[ProjectionRow]) -> Result<()> {
        let partitions = self.partitions.get(&table);
        for row in rows {
            let month = PartitionMonth::of(row.run_date);
            if !partitions.is_some_and(|p| p.contains(&month)) {
                return Err(StorageError::NoPartition {
                    table,
                    run_date: row.run_date,
                });
            }
        }
        Ok(())
    }

    fn check_observed(
        &self,
        run_id: Uuid,
        observed: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        match self.runs.get(&run_id) {
            Some(run) if run.updated_at == observed => Ok(()),
            _ => Err(StorageError::RefreshConflict { run_id }),
        }
    }

    fn rows_where(
        &self,
        table: ProjectionTable,
        predicate: impl Fn(&ProjectionRow) -> bool,
    ) -> Vec<ProjectionRow> {
        self.rows
            .get(&table)
            .map(|rows| rows.iter().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default()
    }
}

/// In-memory fact, projection and partition store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    run_count_estimate: RwLock<Option<u64>>,
    failing_runs: RwLock<HashSet<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_job(&self, job: JobRecord) {
        self.tables.write().await.jobs.insert(job.id, job);
    }

    pub async fn put_dataset(&self, dataset: DatasetRecord) {
        self.tables.write().await.datasets.insert(dataset.id, dataset);
    }

    pub async fn put_dataset_version(&self, version: DatasetVersionRecord) {
        self.tables.write().await.versions.insert(version.id, version);
    }

    /// Insert or replace a run. State transitions are expressed as a
    /// replacement carrying a newer `updated_at`.
    pub async fn put_run(&self, run: RunRecord) {
        self.tables.write().await.runs.insert(run.id, run);
    }

    /// Record that `run_id` consumed `version_id`. Duplicate mappings are ignored.
    pub async fn add_run_input(&self, run_id: Uuid, version_id: Uuid) {
        let mut tables = self.tables.write().await;
        let inputs = tables.inputs.entry(run_id).or_default();
        if !inputs.contains(&version_id) {
            inputs.push(version_id);
        }
    }

    /// Override the statistics estimate returned by `estimate_run_count`.
    pub async fn set_run_count_estimate(&self, estimate: Option<u64>) {
        *self.run_count_estimate.write().await = estimate;
    }

    /// Make every refresh of `run_id` fail with a transient error.
    pub async fn fail_refresh_for(&self, run_id: Uuid) {
        self.failing_runs.write().await.insert(run_id);
    }

    pub async fn clear_refresh_failures(&self) {
        self.failing_runs.write().await.clear();
    }

    /// Snapshot of a projection table, in insertion order.
    pub async fn rows(&self, table: ProjectionTable) -> Vec<ProjectionRow> {
        self.tables
            .read()
            .await
            .rows
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `analyze` calls seen for a table.
    pub async fn analyze_count(&self, table: ProjectionTable) -> usize {
        self.tables
            .read()
            .await
            .analyze_counts
            .get(&table)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    async fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        Ok(self.tables.read().await.runs.get(&run_id).cloned())
    }

    async fn has_children(&self, run_id: Uuid) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .runs
            .values()
            .any(|r| r.parent_run_id == Some(run_id)))
    }

    async fn run_inputs(&self, run_id: Uuid) -> Result<Vec<VersionRef>> {
        Ok(self.tables.read().await.run_inputs(run_id))
    }

    async fn run_outputs(&self, run_id: Uuid) -> Result<Vec<VersionRef>> {
        Ok(self.tables.read().await.run_outputs(run_id))
    }

    async fn find_dataset_version(
        &self,
        namespace: &str,
        name: &str,
        version: Uuid,
    ) -> Result<Option<DatasetVersionRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .versions
            .values()
            .find(|v| v.namespace == namespace && v.name == name && v.version == version)
            .cloned())
    }

    async fn find_job(&self, namespace: &str, name: &str) -> Result<Option<JobRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .jobs
            .values()
            .find(|j| j.namespace == namespace && j.name == name)
            .cloned())
    }

    async fn find_dataset(&self, namespace: &str, name: &str) -> Result<Option<DatasetRecord>> {
        Ok(self
            .tables
            .read()
            .await
            .datasets
            .values()
            .find(|d| d.namespace == namespace && d.name == name)
            .cloned())
    }

    async fn jobs_by_id(&self, ids: &[Uuid]) -> Result<Vec<JobRecord>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.jobs.get(id).cloned()).collect())
    }

    async fn datasets_by_id(&self, ids: &[Uuid]) -> Result<Vec<DatasetRecord>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.datasets.get(id).cloned())
            .collect())
    }

    async fn edges_for_jobs(&self, job_ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>> {
        let tables = self.tables.read().await;
        Ok(tables
            .job_edges()
            .into_iter()
            .filter(|e| job_ids.contains(&e.job_id))
            .collect())
    }

    async fn edges_for_datasets(&self, dataset_ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>> {
        let tables = self.tables.read().await;
        Ok(tables
            .job_edges()
            .into_iter()
            .filter(|e| dataset_ids.contains(&e.dataset_id))
            .collect())
    }

    async fn latest_runs(&self, job_ids: &[Uuid]) -> Result<Vec<RunRecord>> {
        let tables = self.tables.read().await;
        let mut latest: HashMap<Uuid, &RunRecord> = HashMap::new();
        for run in tables.runs.values().filter(|r| job_ids.contains(&r.job_id)) {
            let newer = latest
                .get(&run.job_id)
                .is_none_or(|cur| (run.created_at, run.id) > (cur.created_at, cur.id));
            if newer {
                latest.insert(run.job_id, run);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn estimate_run_count(&self) -> Result<Option<u64>> {
        Ok(*self.run_count_estimate.read().await)
    }

    async fn count_runs(&self) -> Result<u64> {
        Ok(self.tables.read().await.runs.len() as u64)
    }

    async fn run_keys_page(&self, cursor: Option<&RunKey>, limit: usize) -> Result<Vec<RunKey>> {
        let tables = self.tables.read().await;
        let mut keys: Vec<RunKey> = tables
            .runs
            .values()
            .map(RunRecord::key)
            .filter(|k| cursor.is_none_or(|c| k.is_after(c)))
            .collect();
        keys.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        keys.truncate(limit);
        Ok(keys)
    }
}

#[async_trait]
impl ProjectionStore for MemoryStore {
    async fn apply_refresh(&self, refresh: ProjectionRefresh) -> Result<()> {
        if self.failing_runs.read().await.contains(&refresh.run_id) {
            return Err(StorageError::Unavailable(format!(
                "injected failure refreshing run {}",
                refresh.run_id
            )));
        }

        let mut tables = self.tables.write().await;

        // Validate everything before the first mutation.
        tables.check_observed(refresh.run_id, refresh.observed_updated_at)?;
        tables.check_partitions(ProjectionTable::Run, &refresh.run_rows)?;
        tables.check_partitions(ProjectionTable::RunParent, &refresh.parent_rows)?;
        if let Some(parent) = &refresh.parent_contribution {
            tables.check_observed(parent.parent_id, parent.observed_updated_at)?;
            tables.check_partitions(ProjectionTable::RunParent, &parent.rows)?;
        }

        let run_id = refresh.run_id;
        for table in ProjectionTable::ALL {
            tables
                .rows
                .entry(table)
                .or_default()
                .retain(|r| r.run_id != run_id);
        }
        tables
            .rows
            .entry(ProjectionTable::Run)
            .or_default()
            .extend(refresh.run_rows);

        let parent_table = tables.rows.entry(ProjectionTable::RunParent).or_default();
        parent_table.extend(refresh.parent_rows);
        if let Some(parent) = refresh.parent_contribution {
            parent_table.retain(|r| r.run_id != parent.parent_id);
            parent_table.extend(parent.rows);
        }

        Ok(())
    }

    async fn rows_for_keys(
        &self,
        table: ProjectionTable,
        keys: &[Uuid],
    ) -> Result<Vec<ProjectionRow>> {
        let tables = self.tables.read().await;
        Ok(tables.rows_where(table, |r| keys.contains(&r.key(table))))
    }

    async fn rows_consuming(
        &self,
        table: ProjectionTable,
        version_ids: &[Uuid],
    ) -> Result<Vec<ProjectionRow>> {
        let tables = self.tables.read().await;
        Ok(tables.rows_where(table, |r| {
            r.input_version_id().is_some_and(|id| version_ids.contains(&id))
        }))
    }

    async fn rows_producing(
        &self,
        table: ProjectionTable,
        version_ids: &[Uuid],
    ) -> Result<Vec<ProjectionRow>> {
        let tables = self.tables.read().await;
        Ok(tables.rows_where(table, |r| {
            r.output_version_id().is_some_and(|id| version_ids.contains(&id))
        }))
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn list_partitions(&self, table: ProjectionTable) -> Result<Vec<PartitionMonth>> {
        Ok(self
            .tables
            .read()
            .await
            .partitions
            .get(&table)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn create_partition(
        &self,
        table: ProjectionTable,
        month: PartitionMonth,
    ) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .await
            .partitions
            .entry(table)
            .or_default()
            .insert(month))
    }

    async fn drop_partition(&self, table: ProjectionTable, month: PartitionMonth) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let existed = tables
            .partitions
            .get_mut(&table)
            .is_some_and(|p| p.remove(&month));
        if existed {
            if let Some(rows) = tables.rows.get_mut(&table) {
                rows.retain(|r| !month.contains(r.run_date));
            }
        }
        Ok(existed)
    }

    async fn analyze(&self, table: ProjectionTable) -> Result<()> {
        *self
            .tables
            .write()
            .await
            .analyze_counts
            .entry(table)
            .or_default() += 1;
        Ok(())
    }

    async fn partition_stats(&self, table: ProjectionTable) -> Result<Vec<PartitionStats>> {
        let tables = self.tables.read().await;
        let rows = tables.rows.get(&table);
        Ok(tables
            .partitions
            .get(&table)
            .map(|months| {
                months
                    .iter()
                    .map(|month| PartitionStats {
                        table,
                        month: *month,
                        name: month.partition_name(table),
                        row_estimate: rows
                            .map(|r| r.iter().filter(|row| month.contains(row.run_date)).count())
                            .unwrap_or(0) as i64,
                        size_bytes: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests;
