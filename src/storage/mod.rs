//! Storage interfaces and implementations.
//!
//! Three traits split the relational store by concern:
//! - `FactStore`: read access to the authoritative job/run/dataset tables
//! - `ProjectionStore`: transactional refresh and indexed reads of the two
//!   denormalized lineage tables
//! - `PartitionStore`: physical partition DDL and statistics
//!
//! Both backends implement all three on one type, so a refresh can check
//! facts and rewrite projections inside one transaction.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::model::ProjectionTable;

pub mod fact_store;
pub mod memory;
pub mod partition_store;
pub mod projection_store;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub mod schema;

pub use fact_store::FactStore;
pub use memory::MemoryStore;
pub use partition_store::PartitionStore;
pub use projection_store::{ParentContribution, ProjectionRefresh, ProjectionStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No physical partition accepts a row. Never swallowed.
    #[error("no {table} partition accepts run date {run_date}")]
    NoPartition {
        table: ProjectionTable,
        run_date: NaiveDate,
    },

    /// The run's facts moved on after its projection rows were computed.
    #[error("refresh conflict for run {run_id}: facts changed since rows were computed")]
    RefreshConflict { run_id: Uuid },

    #[error("invalid stored value in {column}: {message}")]
    InvalidData {
        column: &'static str,
        message: String,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "postgres")]
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    /// Connectivity and transaction failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) => true,
            #[cfg(feature = "postgres")]
            StorageError::Database(err) => postgres::is_transient(err),
            _ => false,
        }
    }

    /// Optimistic refresh conflict; recompute from facts and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::RefreshConflict { .. })
    }
}

/// Store handles for each concern, all backed by the same database.
#[derive(Clone)]
pub struct Stores {
    pub facts: Arc<dyn FactStore>,
    pub projections: Arc<dyn ProjectionStore>,
    pub partitions: Arc<dyn PartitionStore>,
}

impl Stores {
    /// Share one backend across all three interfaces.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: FactStore + ProjectionStore + PartitionStore + 'static,
    {
        Self {
            facts: backend.clone(),
            projections: backend.clone(),
            partitions: backend,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage = "memory", "Storage initialized");
            Ok(Stores::from_backend(Arc::new(MemoryStore::new())))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let store = PostgresStore::connect(&config.postgres).await?;
            if config.postgres.run_migrations {
                store.migrate().await?;
            }
            info!(storage = "postgres", "Storage initialized");
            Ok(Stores::from_backend(Arc::new(store)))
        }
        #[cfg(not(feature = "postgres"))]
        StorageType::Postgres => Err(StorageError::Unavailable(
            "PostgreSQL storage requested but 'postgres' feature is not enabled".to_string(),
        )),
    }
}
