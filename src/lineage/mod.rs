//! Lineage graph construction.
//!
//! `build_lineage` answers "what surrounds node X, up to D hops" with a
//! bounded, deduplicated graph:
//! - runs and dataset versions are answered from the denormalized run
//!   projections (the fast path)
//! - jobs and datasets are answered from Job↔Dataset edges in the facts
//!
//! Depth counts node hops through the bipartite graph, so from a job,
//! depth 1 reaches its datasets and depth 2 the jobs touching those.
//!
//! Malformed ids and out-of-range depths are rejected before any lookup.
//! A node that cannot be resolved is not an error: the caller receives an
//! empty or single-node graph and a warning is logged.

mod jobs;
mod runs;

use std::sync::Arc;

use tracing::debug;

use crate::config::LineageConfig;
use crate::model::{Graph, NodeId, NodeIdError};
use crate::storage::{FactStore, ProjectionStore, StorageError, Stores};

/// Errors from lineage queries.
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    /// Rejected before lookup: malformed node id or depth out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<NodeIdError> for LineageError {
    fn from(err: NodeIdError) -> Self {
        LineageError::InvalidArgument(err.to_string())
    }
}

/// Builds lineage graphs from facts and run projections.
#[derive(Clone)]
pub struct LineageService {
    facts: Arc<dyn FactStore>,
    projections: Arc<dyn ProjectionStore>,
    config: LineageConfig,
}

impl LineageService {
    pub fn new(stores: &Stores, config: LineageConfig) -> Self {
        Self {
            facts: stores.facts.clone(),
            projections: stores.projections.clone(),
            config,
        }
    }

    /// Depth to use when the caller has no preference.
    pub fn default_depth(&self) -> u32 {
        self.config.default_depth
    }

    /// Lineage of the node named by `node_id` (string form), `depth` hops out.
    ///
    /// With `aggregate_to_parent`, run-scoped queries report from the
    /// perspective of the parent run, reading the run-parent projection.
    pub async fn build_lineage(
        &self,
        node_id: &str,
        depth: i64,
        aggregate_to_parent: bool,
    ) -> Result<Graph, LineageError> {
        let node: NodeId = node_id.parse()?;
        let depth = self.check_depth(depth)?;
        self.lineage(&node, depth, aggregate_to_parent).await
    }

    /// Lineage of an already-parsed node.
    pub async fn lineage(
        &self,
        node: &NodeId,
        depth: u32,
        aggregate_to_parent: bool,
    ) -> Result<Graph, LineageError> {
        let depth = self.check_depth(i64::from(depth))?;

        let graph = if node.is_run_scoped() {
            runs::lineage(
                self.facts.as_ref(),
                self.projections.as_ref(),
                node,
                depth,
                aggregate_to_parent,
            )
            .await?
        } else {
            jobs::lineage(self.facts.as_ref(), node, depth).await?
        };

        debug!(
            node = %node,
            depth,
            aggregate_to_parent,
            nodes = graph.len(),
            "Lineage built"
        );
        Ok(graph)
    }

    fn check_depth(&self, depth: i64) -> Result<u32, LineageError> {
        if depth < 0 {
            return Err(LineageError::InvalidArgument(format!(
                "depth must not be negative, got {depth}"
            )));
        }
        if depth > i64::from(self.config.max_depth) {
            return Err(LineageError::InvalidArgument(format!(
                "depth {depth} exceeds the maximum of {}",
                self.config.max_depth
            )));
        }
        Ok(depth as u32)
    }
}
