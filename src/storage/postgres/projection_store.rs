//! PostgreSQL ProjectionStore implementation.
//!
//! A refresh runs in one transaction holding a transaction-scoped advisory
//! lock per run, so refreshes of the same run serialize while refreshes of
//! different runs only touch their own rows.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Func, PostgresQueryBuilder, Query, SimpleExpr};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{projection_from_row, sqlstate, PostgresStore};
use crate::model::{PartitionMonth, ProjectionRow, ProjectionTable, VersionRef};
use crate::storage::schema::{lineage_table, Lineage};
use crate::storage::{ProjectionRefresh, ProjectionStore, Result, StorageError};

/// "no partition of relation found for row"
const NO_PARTITION_SQLSTATE: &str = "23514";

fn version_values(version: Option<&VersionRef>) -> [SimpleExpr; 4] {
    [
        version.map(|v| v.id).into(),
        version.map(|v| v.namespace.clone()).into(),
        version.map(|v| v.name.clone()).into(),
        version.map(|v| v.version).into(),
    ]
}

fn row_values(row: &ProjectionRow) -> Vec<SimpleExpr> {
    let mut values: Vec<SimpleExpr> = vec![
        row.run_id.into(),
        row.namespace.clone().into(),
        row.job_name.clone().into(),
        row.state.as_str().into(),
        row.created_at.into(),
        row.updated_at.into(),
        row.started_at.into(),
        row.ended_at.into(),
        row.job_id.into(),
        row.job_version_id.into(),
    ];
    values.extend(version_values(row.input.as_ref()));
    values.extend(version_values(row.output.as_ref()));
    values.push(row.parent_run_id.into());
    values.push(row.run_date.into());
    values
}

/// Expression a table's rows are keyed by.
fn key_expr(table: ProjectionTable) -> SimpleExpr {
    match table {
        ProjectionTable::Run => Expr::col(Lineage::RunUuid).into(),
        ProjectionTable::RunParent => Func::coalesce([
            Expr::col(Lineage::ParentRunUuid).into(),
            Expr::col(Lineage::RunUuid).into(),
        ])
        .into(),
    }
}

async fn lock_run(tx: &mut Transaction<'_, Postgres>, run_id: Uuid) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(run_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Fail with `RefreshConflict` unless the run still has `observed` as its
/// `updated_at`. The share lock holds the fact row until commit.
async fn check_observed(
    tx: &mut Transaction<'_, Postgres>,
    run_id: Uuid,
    observed: DateTime<Utc>,
) -> Result<()> {
    let row = sqlx::query("SELECT updated_at FROM runs WHERE uuid = $1 FOR SHARE")
        .bind(run_id)
        .fetch_optional(&mut **tx)
        .await?;
    let current: Option<DateTime<Utc>> = row.map(|r| r.try_get("updated_at")).transpose()?;
    if current != Some(observed) {
        return Err(StorageError::RefreshConflict { run_id });
    }
    Ok(())
}

async fn delete_by_run(
    tx: &mut Transaction<'_, Postgres>,
    table: ProjectionTable,
    run_id: Uuid,
) -> Result<()> {
    let query = Query::delete()
        .from_table(lineage_table(table))
        .and_where(Expr::col(Lineage::RunUuid).eq(run_id))
        .to_string(PostgresQueryBuilder);
    sqlx::query(&query).execute(&mut **tx).await?;
    Ok(())
}

/// Multi-row insert for one month's rows. Rendered synchronously so no
/// statement builder lives across an await.
fn insert_query(table: ProjectionTable, rows: &[&ProjectionRow]) -> String {
    let mut insert = Query::insert();
    insert
        .into_table(lineage_table(table))
        .columns(Lineage::COLUMNS);
    for row in rows {
        insert.values_panic(row_values(row));
    }
    insert.to_string(PostgresQueryBuilder)
}

/// Select of full rows matching `filter`.
fn select_query(table: ProjectionTable, filter: SimpleExpr) -> String {
    Query::select()
        .columns(Lineage::COLUMNS)
        .from(lineage_table(table))
        .and_where(filter)
        .to_string(PostgresQueryBuilder)
}

/// Insert rows one month at a time, so a missing partition is reported
/// with the run date it would have held.
async fn insert_rows(
    tx: &mut Transaction<'_, Postgres>,
    table: ProjectionTable,
    rows: &[ProjectionRow],
) -> Result<()> {
    let mut by_month: BTreeMap<PartitionMonth, Vec<&ProjectionRow>> = BTreeMap::new();
    for row in rows {
        by_month
            .entry(PartitionMonth::of(row.run_date))
            .or_default()
            .push(row);
    }

    for (_, month_rows) in by_month {
        let query = insert_query(table, &month_rows);

        match sqlx::query(&query).execute(&mut **tx).await {
            Ok(_) => {}
            Err(e) if sqlstate(&e).as_deref() == Some(NO_PARTITION_SQLSTATE) => {
                return Err(StorageError::NoPartition {
                    table,
                    run_date: month_rows[0].run_date,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

impl PostgresStore {
    async fn select_rows(&self, query: String) -> Result<Vec<ProjectionRow>> {
        let rows = sqlx::query(&query).fetch_all(self.pool()).await?;
        rows.iter().map(projection_from_row).collect()
    }
}

#[async_trait]
impl ProjectionStore for PostgresStore {
    async fn apply_refresh(&self, refresh: ProjectionRefresh) -> Result<()> {
        let run_id = refresh.run_id;
        let mut tx = self.pool().begin().await?;

        // Child before parent; a parent refresh never locks its children.
        lock_run(&mut tx, run_id).await?;
        check_observed(&mut tx, run_id, refresh.observed_updated_at).await?;
        if let Some(parent) = &refresh.parent_contribution {
            lock_run(&mut tx, parent.parent_id).await?;
            check_observed(&mut tx, parent.parent_id, parent.observed_updated_at).await?;
        }

        for table in ProjectionTable::ALL {
            delete_by_run(&mut tx, table, run_id).await?;
        }
        insert_rows(&mut tx, ProjectionTable::Run, &refresh.run_rows).await?;
        insert_rows(&mut tx, ProjectionTable::RunParent, &refresh.parent_rows).await?;

        if let Some(parent) = &refresh.parent_contribution {
            delete_by_run(&mut tx, ProjectionTable::RunParent, parent.parent_id).await?;
            insert_rows(&mut tx, ProjectionTable::RunParent, &parent.rows).await?;
        }

        // Dropping `tx` on any early return above rolls back.
        tx.commit().await?;
        Ok(())
    }

    async fn rows_for_keys(
        &self,
        table: ProjectionTable,
        keys: &[Uuid],
    ) -> Result<Vec<ProjectionRow>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }
        let query = select_query(
            table,
            Expr::expr(key_expr(table)).is_in(keys.iter().copied()),
        );
        self.select_rows(query).await
    }

    async fn rows_consuming(
        &self,
        table: ProjectionTable,
        version_ids: &[Uuid],
    ) -> Result<Vec<ProjectionRow>> {
        if version_ids.is_empty() {
            return Ok(vec![]);
        }
        let query = select_query(
            table,
            Expr::col(Lineage::InputVersionUuid).is_in(version_ids.iter().copied()),
        );
        self.select_rows(query).await
    }

    async fn rows_producing(
        &self,
        table: ProjectionTable,
        version_ids: &[Uuid],
    ) -> Result<Vec<ProjectionRow>> {
        if version_ids.is_empty() {
            return Ok(vec![]);
        }
        let query = select_query(
            table,
            Expr::col(Lineage::OutputVersionUuid).is_in(version_ids.iter().copied()),
        );
        self.select_rows(query).await
    }
}
