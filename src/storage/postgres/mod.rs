//! PostgreSQL implementations of storage interfaces.
//!
//! One `PostgresStore` over a shared pool implements all three store traits,
//! so a projection refresh can verify facts and rewrite projections in a
//! single transaction.

mod fact_store;
mod partition_store;
mod projection_store;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::config::PostgresConfig;
use crate::model::{ProjectionRow, RunRecord, RunState, VersionRef};
use crate::storage::{Result, StorageError};

/// PostgreSQL fact, projection and partition store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `config.uri`.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.uri)
            .await?;
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("migrations/postgres").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connectivity loss, pool exhaustion, serialization failures and deadlocks.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            matches!(code.as_ref(), "40001" | "40P01" | "57P01" | "53300") || code.starts_with("08")
        }),
        _ => false,
    }
}

/// SQLSTATE of a database error, if any.
fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn parse_state(raw: &str) -> Result<RunState> {
    raw.parse().map_err(|message| StorageError::InvalidData {
        column: "state",
        message,
    })
}

fn run_from_row(row: &PgRow) -> Result<RunRecord> {
    let state: String = row.try_get("current_run_state")?;
    Ok(RunRecord {
        id: row.try_get("uuid")?,
        job_id: row.try_get("job_uuid")?,
        job_version_id: row.try_get("job_version_uuid")?,
        namespace: row.try_get("namespace_name")?,
        job_name: row.try_get("job_name")?,
        state: parse_state(&state)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        parent_run_id: row.try_get("parent_run_uuid")?,
    })
}

/// Version triple stored in the `<prefix>_*` projection columns.
fn version_from_row(row: &PgRow, prefix: &'static str) -> Result<Option<VersionRef>> {
    let id: Option<Uuid> = row.try_get(format!("{prefix}_version_uuid").as_str())?;
    let Some(id) = id else {
        return Ok(None);
    };
    let namespace: Option<String> = row.try_get(format!("{prefix}_namespace").as_str())?;
    let name: Option<String> = row.try_get(format!("{prefix}_dataset_name").as_str())?;
    let version: Option<Uuid> = row.try_get(format!("{prefix}_version").as_str())?;
    match (namespace, name, version) {
        (Some(namespace), Some(name), Some(version)) => Ok(Some(VersionRef {
            id,
            namespace,
            name,
            version,
        })),
        _ => Err(StorageError::InvalidData {
            column: prefix,
            message: format!("version {id} is missing its namespace, name or version"),
        }),
    }
}

fn projection_from_row(row: &PgRow) -> Result<ProjectionRow> {
    let state: String = row.try_get("state")?;
    Ok(ProjectionRow {
        run_id: row.try_get("run_uuid")?,
        namespace: row.try_get("namespace_name")?,
        job_name: row.try_get("job_name")?,
        state: parse_state(&state)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        job_id: row.try_get("job_uuid")?,
        job_version_id: row.try_get("job_version_uuid")?,
        input: version_from_row(row, "input")?,
        output: version_from_row(row, "output")?,
        parent_run_id: row.try_get("parent_run_uuid")?,
        run_date: row.try_get("run_date")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(is_transient(&sqlx::Error::PoolTimedOut));
        assert!(!is_transient(&sqlx::Error::RowNotFound));
        assert!(!is_transient(&sqlx::Error::PoolClosed));
    }

    #[test]
    fn test_parse_state_reports_column() {
        let err = parse_state("PAUSED").unwrap_err();
        assert!(matches!(err, StorageError::InvalidData { column: "state", .. }));
    }
}
