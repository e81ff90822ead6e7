//! PostgreSQL PartitionStore implementation.
//!
//! Partitions are ordinary tables attached with `PARTITION OF`; names come
//! from `PartitionMonth::partition_name`, so listing parses them back.

use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use super::{sqlstate, PostgresStore};
use crate::model::{PartitionMonth, PartitionStats, ProjectionTable};
use crate::storage::{PartitionStore, Result};

/// Raised when a concurrent CREATE won the race.
const ALREADY_EXISTS_SQLSTATES: [&str; 2] = ["42P07", "23505"];

const CHILD_PARTITIONS: &str = "SELECT c.relname AS name, \
            c.reltuples::BIGINT AS row_estimate, \
            pg_total_relation_size(c.oid) AS size_bytes \
     FROM pg_inherits i \
     JOIN pg_class c ON c.oid = i.inhrelid \
     JOIN pg_class p ON p.oid = i.inhparent \
     WHERE p.relname = $1";

fn create_partition_sql(table: ProjectionTable, month: PartitionMonth) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} PARTITION OF {parent} \
         FOR VALUES FROM ('{from}') TO ('{to}')",
        name = month.partition_name(table),
        parent = table.table_name(),
        from = month.first_day(),
        to = month.end_exclusive(),
    )
}

impl PostgresStore {
    async fn partition_exists(
        &self,
        table: ProjectionTable,
        month: PartitionMonth,
    ) -> Result<bool> {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL AS present")
            .bind(month.partition_name(table))
            .fetch_one(self.pool())
            .await?;
        Ok(row.try_get("present")?)
    }
}

#[async_trait]
impl PartitionStore for PostgresStore {
    async fn list_partitions(&self, table: ProjectionTable) -> Result<Vec<PartitionMonth>> {
        let rows = sqlx::query(CHILD_PARTITIONS)
            .bind(table.table_name())
            .fetch_all(self.pool())
            .await?;

        let mut months = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            match PartitionMonth::from_partition_name(table, &name) {
                Some(month) => months.push(month),
                None => debug!(%table, partition = %name, "Ignoring foreign partition"),
            }
        }
        months.sort();
        Ok(months)
    }

    async fn create_partition(
        &self,
        table: ProjectionTable,
        month: PartitionMonth,
    ) -> Result<bool> {
        if self.partition_exists(table, month).await? {
            return Ok(false);
        }

        match sqlx::query(&create_partition_sql(table, month))
            .execute(self.pool())
            .await
        {
            Ok(_) => Ok(true),
            Err(e)
                if sqlstate(&e)
                    .is_some_and(|code| ALREADY_EXISTS_SQLSTATES.contains(&code.as_str())) =>
            {
                debug!(%table, %month, "Partition created concurrently");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn drop_partition(&self, table: ProjectionTable, month: PartitionMonth) -> Result<bool> {
        if !self.partition_exists(table, month).await? {
            return Ok(false);
        }
        let query = format!("DROP TABLE IF EXISTS {}", month.partition_name(table));
        sqlx::query(&query).execute(self.pool()).await?;
        Ok(true)
    }

    async fn analyze(&self, table: ProjectionTable) -> Result<()> {
        let query = format!("ANALYZE {}", table.table_name());
        sqlx::query(&query).execute(self.pool()).await?;
        Ok(())
    }

    async fn partition_stats(&self, table: ProjectionTable) -> Result<Vec<PartitionStats>> {
        let rows = sqlx::query(CHILD_PARTITIONS)
            .bind(table.table_name())
            .fetch_all(self.pool())
            .await?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let Some(month) = PartitionMonth::from_partition_name(table, &name) else {
                continue;
            };
            let row_estimate: i64 = row.try_get("row_estimate")?;
            stats.push(PartitionStats {
                table,
                month,
                name,
                row_estimate: row_estimate.max(0),
                size_bytes: row.try_get("size_bytes")?,
            });
        }
        stats.sort_by_key(|s| s.month);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_partition_sql_covers_one_month() {
        let month = PartitionMonth::new(2026, 12).unwrap();
        assert_eq!(
            create_partition_sql(ProjectionTable::Run, month),
            "CREATE TABLE IF NOT EXISTS run_lineage_denormalized_y2026m12 \
             PARTITION OF run_lineage_denormalized \
             FOR VALUES FROM ('2026-12-01') TO ('2027-01-01')"
        );
    }
}
