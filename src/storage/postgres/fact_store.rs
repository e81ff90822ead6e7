//! PostgreSQL FactStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, PostgresQueryBuilder, Query};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{run_from_row, PostgresStore};
use crate::model::{
    DatasetRecord, DatasetVersionRecord, EdgeDirection, JobDatasetEdge, JobRecord, RunKey,
    RunRecord, VersionRef,
};
use crate::storage::schema::{DatasetVersions, Datasets, Jobs, Runs, RunsInputMapping};
use crate::storage::{FactStore, Result, StorageError};

fn job_from_row(row: &PgRow) -> Result<JobRecord> {
    Ok(JobRecord {
        id: row.try_get("uuid")?,
        namespace: row.try_get("namespace_name")?,
        name: row.try_get("name")?,
        current_version_id: row.try_get("current_version_uuid")?,
    })
}

fn dataset_from_row(row: &PgRow) -> Result<DatasetRecord> {
    Ok(DatasetRecord {
        id: row.try_get("uuid")?,
        namespace: row.try_get("namespace_name")?,
        name: row.try_get("name")?,
    })
}

fn dataset_version_from_row(row: &PgRow) -> Result<DatasetVersionRecord> {
    Ok(DatasetVersionRecord {
        id: row.try_get("uuid")?,
        dataset_id: row.try_get("dataset_uuid")?,
        namespace: row.try_get("namespace_name")?,
        name: row.try_get("dataset_name")?,
        version: row.try_get("version")?,
        producing_run_id: row.try_get("run_uuid")?,
    })
}

fn version_ref_from_row(row: &PgRow) -> Result<VersionRef> {
    Ok(VersionRef {
        id: row.try_get("uuid")?,
        namespace: row.try_get("namespace_name")?,
        name: row.try_get("dataset_name")?,
        version: row.try_get("version")?,
    })
}

fn key_from_row(row: &PgRow) -> Result<RunKey> {
    Ok(RunKey {
        id: row.try_get("uuid")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn edge_from_row(row: &PgRow) -> Result<JobDatasetEdge> {
    let io_type: String = row.try_get("io_type")?;
    Ok(JobDatasetEdge {
        job_id: row.try_get("job_uuid")?,
        dataset_id: row.try_get("dataset_uuid")?,
        direction: io_type
            .parse()
            .map_err(|message| StorageError::InvalidData {
                column: "io_type",
                message,
            })?,
    })
}

/// Job↔Dataset edges derived from run input mappings and produced versions.
/// `$1` is a uuid array matched against `filter_column`.
fn edges_query(filter_column: &str) -> String {
    format!(
        "SELECT r.job_uuid, dv.dataset_uuid, '{input}' AS io_type \
         FROM runs_input_mapping m \
         JOIN runs r ON r.uuid = m.run_uuid \
         JOIN dataset_versions dv ON dv.uuid = m.dataset_version_uuid \
         WHERE {filter_column} = ANY($1) \
         UNION \
         SELECT r.job_uuid, dv.dataset_uuid, '{output}' AS io_type \
         FROM dataset_versions dv \
         JOIN runs r ON r.uuid = dv.run_uuid \
         WHERE {filter_column} = ANY($1) \
         ORDER BY job_uuid, dataset_uuid, io_type",
        input = EdgeDirection::Input.as_str(),
        output = EdgeDirection::Output.as_str(),
    )
}

/// Newest-first page of run keys strictly after `cursor`.
fn run_keys_query(cursor: Option<&RunKey>, limit: usize) -> String {
    let mut select = Query::select();
    select
        .columns([Runs::Uuid, Runs::CreatedAt, Runs::StartedAt, Runs::EndedAt])
        .from(Runs::Table)
        .order_by(Runs::CreatedAt, Order::Desc)
        .order_by(Runs::Uuid, Order::Desc)
        .limit(limit as u64);
    if let Some(cursor) = cursor {
        select.and_where(
            Expr::tuple([Expr::col(Runs::CreatedAt).into(), Expr::col(Runs::Uuid).into()]).lt(
                Expr::tuple([
                    Expr::val(cursor.created_at).into(),
                    Expr::val(cursor.id).into(),
                ]),
            ),
        );
    }
    select.to_string(PostgresQueryBuilder)
}

impl PostgresStore {
    async fn fetch_edges(&self, filter_column: &str, ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query(&edges_query(filter_column))
            .bind(ids)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(edge_from_row).collect()
    }
}

#[async_trait]
impl FactStore for PostgresStore {
    async fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let query = Query::select()
            .columns(Runs::COLUMNS)
            .from(Runs::Table)
            .and_where(Expr::col(Runs::Uuid).eq(run_id))
            .to_string(PostgresQueryBuilder);
        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn has_children(&self, run_id: Uuid) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM runs WHERE parent_run_uuid = $1)")
            .bind(run_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn run_inputs(&self, run_id: Uuid) -> Result<Vec<VersionRef>> {
        let query = Query::select()
            .columns([
                (DatasetVersions::Table, DatasetVersions::Uuid),
                (DatasetVersions::Table, DatasetVersions::NamespaceName),
                (DatasetVersions::Table, DatasetVersions::DatasetName),
                (DatasetVersions::Table, DatasetVersions::Version),
            ])
            .from(RunsInputMapping::Table)
            .inner_join(
                DatasetVersions::Table,
                Expr::col((DatasetVersions::Table, DatasetVersions::Uuid))
                    .equals((RunsInputMapping::Table, RunsInputMapping::DatasetVersionUuid)),
            )
            .and_where(Expr::col((RunsInputMapping::Table, RunsInputMapping::RunUuid)).eq(run_id))
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(version_ref_from_row).collect()
    }

    async fn run_outputs(&self, run_id: Uuid) -> Result<Vec<VersionRef>> {
        let query = Query::select()
            .columns([
                DatasetVersions::Uuid,
                DatasetVersions::NamespaceName,
                DatasetVersions::DatasetName,
                DatasetVersions::Version,
            ])
            .from(DatasetVersions::Table)
            .and_where(Expr::col(DatasetVersions::RunUuid).eq(run_id))
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(version_ref_from_row).collect()
    }

    async fn find_dataset_version(
        &self,
        namespace: &str,
        name: &str,
        version: Uuid,
    ) -> Result<Option<DatasetVersionRecord>> {
        let query = Query::select()
            .columns([
                DatasetVersions::Uuid,
                DatasetVersions::DatasetUuid,
                DatasetVersions::NamespaceName,
                DatasetVersions::DatasetName,
                DatasetVersions::Version,
                DatasetVersions::RunUuid,
            ])
            .from(DatasetVersions::Table)
            .and_where(Expr::col(DatasetVersions::NamespaceName).eq(namespace))
            .and_where(Expr::col(DatasetVersions::DatasetName).eq(name))
            .and_where(Expr::col(DatasetVersions::Version).eq(version))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(dataset_version_from_row).transpose()
    }

    async fn find_job(&self, namespace: &str, name: &str) -> Result<Option<JobRecord>> {
        let query = Query::select()
            .columns([
                Jobs::Uuid,
                Jobs::NamespaceName,
                Jobs::Name,
                Jobs::CurrentVersionUuid,
            ])
            .from(Jobs::Table)
            .and_where(Expr::col(Jobs::NamespaceName).eq(namespace))
            .and_where(Expr::col(Jobs::Name).eq(name))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn find_dataset(&self, namespace: &str, name: &str) -> Result<Option<DatasetRecord>> {
        let query = Query::select()
            .columns([Datasets::Uuid, Datasets::NamespaceName, Datasets::Name])
            .from(Datasets::Table)
            .and_where(Expr::col(Datasets::NamespaceName).eq(namespace))
            .and_where(Expr::col(Datasets::Name).eq(name))
            .to_string(PostgresQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(self.pool()).await?;
        row.as_ref().map(dataset_from_row).transpose()
    }

    async fn jobs_by_id(&self, ids: &[Uuid]) -> Result<Vec<JobRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let query = Query::select()
            .columns([
                Jobs::Uuid,
                Jobs::NamespaceName,
                Jobs::Name,
                Jobs::CurrentVersionUuid,
            ])
            .from(Jobs::Table)
            .and_where(Expr::col(Jobs::Uuid).is_in(ids.iter().copied()))
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn datasets_by_id(&self, ids: &[Uuid]) -> Result<Vec<DatasetRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let query = Query::select()
            .columns([Datasets::Uuid, Datasets::NamespaceName, Datasets::Name])
            .from(Datasets::Table)
            .and_where(Expr::col(Datasets::Uuid).is_in(ids.iter().copied()))
            .to_string(PostgresQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(dataset_from_row).collect()
    }

    async fn edges_for_jobs(&self, job_ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>> {
        self.fetch_edges("r.job_uuid", job_ids).await
    }

    async fn edges_for_datasets(&self, dataset_ids: &[Uuid]) -> Result<Vec<JobDatasetEdge>> {
        self.fetch_edges("dv.dataset_uuid", dataset_ids).await
    }

    async fn latest_runs(&self, job_ids: &[Uuid]) -> Result<Vec<RunRecord>> {
        if job_ids.is_empty() {
            return Ok(vec![]);
        }
        let query = Query::select()
            .distinct_on([Runs::JobUuid])
            .columns(Runs::COLUMNS)
            .from(Runs::Table)
            .and_where(Expr::col(Runs::JobUuid).is_in(job_ids.iter().copied()))
            .order_by(Runs::JobUuid, Order::Asc)
            .order_by(Runs::CreatedAt, Order::Desc)
            .order_by(Runs::Uuid, Order::Desc)
            .to_string(PostgresQueryBuilder);
        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn estimate_run_count(&self) -> Result<Option<u64>> {
        let row = sqlx::query(
            "SELECT reltuples::BIGINT AS estimate FROM pg_class WHERE oid = 'runs'::regclass",
        )
        .fetch_optional(self.pool())
        .await?;
        let estimate: Option<i64> = row.map(|r| r.try_get("estimate")).transpose()?;
        // -1 (never analyzed) and 0 are indistinguishable from "no statistics".
        Ok(estimate.filter(|n| *n > 0).map(|n| n as u64))
    }

    async fn count_runs(&self) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Runs::Uuid).count())
            .from(Runs::Table)
            .to_string(PostgresQueryBuilder);
        let row = sqlx::query(&query).fetch_one(self.pool()).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn run_keys_page(&self, cursor: Option<&RunKey>, limit: usize) -> Result<Vec<RunKey>> {
        let query = run_keys_query(cursor, limit);
        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(key_from_row).collect()
    }
}
