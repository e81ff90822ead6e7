//! Lineage graph output.
//!
//! A `Graph` is a sorted, deduplicated list of nodes. Each node carries its
//! incoming and outgoing edges, restricted to nodes present in the graph.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::facts::{DatasetRecord, JobRecord, RunRecord, RunState, VersionRef};
use super::node::{NodeId, NodeType};
use super::projection::ProjectionRow;

/// Directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub origin: NodeId,
    pub destination: NodeId,
}

impl Edge {
    pub fn new(origin: NodeId, destination: NodeId) -> Self {
        Self {
            origin,
            destination,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    pub id: Uuid,
    pub namespace: String,
    pub job_name: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub parent_run_id: Option<Uuid>,
}

impl From<&RunRecord> for RunData {
    fn from(run: &RunRecord) -> Self {
        Self {
            id: run.id,
            namespace: run.namespace.clone(),
            job_name: run.job_name.clone(),
            state: run.state,
            created_at: run.created_at,
            updated_at: run.updated_at,
            started_at: run.started_at,
            ended_at: run.ended_at,
            parent_run_id: run.parent_run_id,
        }
    }
}

impl RunData {
    /// Run attributes carried on a projection row. The parent column is only
    /// the run's own parent when `row.run_id` is the node being described.
    pub fn from_row(row: &ProjectionRow) -> Self {
        Self {
            id: row.run_id,
            namespace: row.namespace.clone(),
            job_name: row.job_name.clone(),
            state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            parent_run_id: row.parent_run_id.filter(|p| *p != row.run_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetVersionData {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub version: Uuid,
}

impl From<&VersionRef> for DatasetVersionData {
    fn from(v: &VersionRef) -> Self {
        Self {
            id: v.id,
            namespace: v.namespace.clone(),
            name: v.name.clone(),
            version: v.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub latest_run: Option<RunData>,
}

impl JobData {
    pub fn new(job: &JobRecord, latest_run: Option<&RunRecord>) -> Self {
        Self {
            id: job.id,
            namespace: job.namespace.clone(),
            name: job.name.clone(),
            latest_run: latest_run.map(RunData::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetData {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
}

impl From<&DatasetRecord> for DatasetData {
    fn from(d: &DatasetRecord) -> Self {
        Self {
            id: d.id,
            namespace: d.namespace.clone(),
            name: d.name.clone(),
        }
    }
}

/// Per-variant node attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeData {
    Dataset(DatasetData),
    DatasetVersion(DatasetVersionData),
    Job(JobData),
    Run(RunData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Absent for orphan nodes whose facts could not be resolved.
    pub data: Option<NodeData>,
    pub in_edges: Vec<Edge>,
    pub out_edges: Vec<Edge>,
}

/// Deduplicated lineage graph in stable (type, identity) order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Graph {
    pub graph: Vec<Node>,
}

impl Graph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Single-node graph used for orphans.
    pub fn single(id: NodeId, data: Option<NodeData>) -> Self {
        let mut builder = GraphBuilder::new();
        builder.add_node(id, data);
        builder.build()
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.graph
            .binary_search_by(|n| n.id.cmp(id))
            .ok()
            .map(|i| &self.graph[i])
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// All edges, each reported once, in sorted order.
    pub fn edges(&self) -> Vec<Edge> {
        self.graph
            .iter()
            .flat_map(|n| n.out_edges.iter().cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.graph.iter().map(|n| n.id.clone()).collect()
    }
}

/// Accumulates nodes and edges, then emits a sorted `Graph`.
///
/// Edges whose endpoints were never added as nodes are dropped on build.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<NodeId, Option<NodeData>>,
    edges: BTreeSet<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node. Existing data is kept unless it is absent.
    pub fn add_node(&mut self, id: NodeId, data: Option<NodeData>) {
        let slot = self.nodes.entry(id).or_insert(None);
        if slot.is_none() {
            *slot = data;
        }
    }

    pub fn add_edge(&mut self, origin: NodeId, destination: NodeId) {
        self.edges.insert(Edge::new(origin, destination));
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Ids of nodes still lacking data.
    pub fn missing_data(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, data)| data.is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn build(self) -> Graph {
        let mut in_edges: BTreeMap<NodeId, Vec<Edge>> = BTreeMap::new();
        let mut out_edges: BTreeMap<NodeId, Vec<Edge>> = BTreeMap::new();

        for edge in self.edges {
            if !self.nodes.contains_key(&edge.origin) || !self.nodes.contains_key(&edge.destination)
            {
                continue;
            }
            out_edges
                .entry(edge.origin.clone())
                .or_default()
                .push(edge.clone());
            in_edges.entry(edge.destination.clone()).or_default().push(edge);
        }

        let graph = self
            .nodes
            .into_iter()
            .map(|(id, data)| Node {
                node_type: id.node_type(),
                in_edges: in_edges.remove(&id).unwrap_or_default(),
                out_edges: out_edges.remove(&id).unwrap_or_default(),
                id,
                data,
            })
            .collect();

        Graph { graph }
    }
}
