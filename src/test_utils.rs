//! Test fixtures for lineage facts.
//!
//! Builds jobs, datasets, runs and dataset versions in a `MemoryStore`
//! without repeating record boilerplate in every test.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::model::{
    DatasetRecord, DatasetVersionRecord, JobRecord, PartitionMonth, ProjectionTable, RunRecord,
    RunState,
};
use crate::storage::{MemoryStore, PartitionStore, Stores};

/// Noon UTC on the given day.
pub fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {year}-{month}-{day}"))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    ts(year, month, day).date_naive()
}

/// Fact builder over a shared `MemoryStore`.
#[derive(Clone, Default)]
pub struct LineageFixture {
    pub store: Arc<MemoryStore>,
}

impl LineageFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores::from_backend(self.store.clone())
    }

    pub async fn job(&self, namespace: &str, name: &str) -> JobRecord {
        let job = JobRecord {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            current_version_id: Some(Uuid::new_v4()),
        };
        self.store.put_job(job.clone()).await;
        job
    }

    pub async fn dataset(&self, namespace: &str, name: &str) -> DatasetRecord {
        let dataset = DatasetRecord {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.store.put_dataset(dataset.clone()).await;
        dataset
    }

    /// A COMPLETE run of `job` that started and ended at `started`.
    pub async fn run(&self, job: &JobRecord, started: DateTime<Utc>) -> RunRecord {
        self.insert_run(job, None, started).await
    }

    /// A COMPLETE child run of `parent`.
    pub async fn child_run(
        &self,
        job: &JobRecord,
        parent: &RunRecord,
        started: DateTime<Utc>,
    ) -> RunRecord {
        self.insert_run(job, Some(parent.id), started).await
    }

    async fn insert_run(
        &self,
        job: &JobRecord,
        parent_run_id: Option<Uuid>,
        started: DateTime<Utc>,
    ) -> RunRecord {
        let run = RunRecord {
            id: Uuid::new_v4(),
            job_id: job.id,
            job_version_id: job.current_version_id,
            namespace: job.namespace.clone(),
            job_name: job.name.clone(),
            state: RunState::Complete,
            created_at: started,
            updated_at: started,
            started_at: Some(started),
            ended_at: Some(started),
            parent_run_id,
        };
        self.store.put_run(run.clone()).await;
        run
    }

    /// Move `run` to `state` at `at`, bumping `updated_at`.
    pub async fn transition(
        &self,
        run: &RunRecord,
        state: RunState,
        at: DateTime<Utc>,
    ) -> RunRecord {
        let mut next = run.clone();
        next.state = state;
        next.updated_at = at;
        if state.is_terminal() {
            next.ended_at = Some(at);
        }
        self.store.put_run(next.clone()).await;
        next
    }

    /// A new version of `dataset` produced by `run`.
    pub async fn produce(&self, run: &RunRecord, dataset: &DatasetRecord) -> DatasetVersionRecord {
        let version = DatasetVersionRecord {
            id: Uuid::new_v4(),
            dataset_id: dataset.id,
            namespace: dataset.namespace.clone(),
            name: dataset.name.clone(),
            version: Uuid::new_v4(),
            producing_run_id: Some(run.id),
        };
        self.store.put_dataset_version(version.clone()).await;
        version
    }

    pub async fn consume(&self, run: &RunRecord, version: &DatasetVersionRecord) {
        self.store.add_run_input(run.id, version.id).await;
    }

    /// Create the month partition containing `date` in both tables.
    pub async fn partition_for(&self, date: NaiveDate) {
        for table in ProjectionTable::ALL {
            self.store
                .create_partition(table, PartitionMonth::of(date))
                .await
                .unwrap_or_else(|e| panic!("fixture partition creation failed: {e}"));
        }
    }
}
