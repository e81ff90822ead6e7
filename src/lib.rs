//! Tributary - lineage graphs for data-pipeline metadata
//!
//! Computes bounded lineage graphs over jobs, runs, datasets and dataset
//! versions, and keeps the denormalized run projections those graphs are
//! read from in step with run facts, partitioned by month and backfillable
//! in bulk.

pub mod backfill;
pub mod config;
pub mod lineage;
pub mod model;
pub mod partition;
pub mod projection;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
