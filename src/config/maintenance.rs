//! Lineage query, partition maintenance and backfill configuration.

use serde::Deserialize;

/// Graph traversal bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    /// Depth used when a caller does not ask for one.
    pub default_depth: u32,
    /// Deepest traversal accepted; deeper requests are rejected.
    pub max_depth: u32,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            default_depth: 20,
            max_depth: 100,
        }
    }
}

/// Partition lookahead, retention and scheduling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Months after the current one that must always have partitions.
    pub lookahead_months: u32,
    /// Months of history kept before the current one. `None` keeps everything.
    pub retention_months: Option<u32>,
    /// Seconds between maintenance passes.
    pub interval_secs: u64,
    /// Refresh planner statistics after a pass that changed partitions.
    pub analyze_after_maintenance: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            lookahead_months: 3,
            retention_months: None,
            interval_secs: 86_400,
            analyze_after_maintenance: true,
        }
    }
}

/// Bulk projection rebuild.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Runs refreshed per chunk.
    pub chunk_size: usize,
    /// Automatic backfills above this estimated run count are refused.
    pub large_dataset_threshold: u64,
    /// Minimum seconds between progress log lines.
    pub progress_interval_secs: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            large_dataset_threshold: 100_000,
            progress_interval_secs: 30,
        }
    }
}
