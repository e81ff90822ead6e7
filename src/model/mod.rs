//! Domain types shared by the graph builder, projection maintainer,
//! partition manager and backfill coordinator.
//!
//! - `node`: the closed `NodeId` union and its string form
//! - `graph`: lineage graph output (nodes, edges, per-variant data)
//! - `facts`: records read from the authoritative fact tables
//! - `projection`: denormalized rows and the two projection tables
//! - `partition`: calendar-month partition keys

pub mod facts;
pub mod graph;
pub mod node;
pub mod partition;
pub mod projection;

pub use facts::{
    run_date, DatasetRecord, DatasetVersionRecord, EdgeDirection, JobDatasetEdge, JobRecord,
    RunKey, RunRecord, RunState, VersionRef,
};
pub use graph::{
    DatasetData, DatasetVersionData, Edge, Graph, GraphBuilder, JobData, Node, NodeData, RunData,
};
pub use node::{NodeId, NodeIdError, NodeType, QualifiedName};
pub use partition::{PartitionMonth, PartitionStats};
pub use projection::{ProjectionRow, ProjectionTable};
