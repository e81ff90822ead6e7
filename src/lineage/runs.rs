//! Run-scoped traversal over the run projections.
//!
//! Runs sit at even distances from the start and dataset versions at odd
//! ones. Every expansion reads all edges of the frontier, so an edge
//! between two included nodes is always found from whichever end is
//! closer to the start.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{
    DatasetVersionData, Graph, GraphBuilder, NodeData, NodeId, ProjectionRow, ProjectionTable,
    RunData, VersionRef,
};
use crate::storage::{FactStore, ProjectionStore, Result};

pub(super) async fn lineage(
    facts: &dyn FactStore,
    projections: &dyn ProjectionStore,
    node: &NodeId,
    depth: u32,
    aggregate_to_parent: bool,
) -> Result<Graph> {
    let runs = resolve_runs(facts, node, aggregate_to_parent).await?;
    if runs.is_empty() {
        warn!(node = %node, "No runs resolved for lineage query; returning empty graph");
        return Ok(Graph::empty());
    }

    let table = choose_table(facts, &runs, aggregate_to_parent).await?;
    debug!(node = %node, %table, runs = runs.len(), "Traversing run projection");

    let mut traversal = RunTraversal::new(projections, table);
    traversal.run(runs, depth).await?;
    let mut builder = traversal.builder;
    fill_run_data(facts, &mut builder).await?;
    Ok(builder.build())
}

/// Concrete run ids the query starts from.
async fn resolve_runs(
    facts: &dyn FactStore,
    node: &NodeId,
    aggregate_to_parent: bool,
) -> Result<Vec<Uuid>> {
    let run_id = match node {
        NodeId::Run(id) => *id,
        NodeId::DatasetVersion { dataset, version } => {
            let Some(found) = facts
                .find_dataset_version(&dataset.namespace, &dataset.name, *version)
                .await?
            else {
                warn!(node = %node, "Dataset version not found");
                return Ok(vec![]);
            };
            let Some(producer) = found.producing_run_id else {
                warn!(node = %node, "Dataset version has no producing run");
                return Ok(vec![]);
            };
            producer
        }
        NodeId::Job(_) | NodeId::Dataset(_) => return Ok(vec![]),
    };

    let Some(run) = facts.get_run(run_id).await? else {
        warn!(node = %node, %run_id, "Run not found");
        return Ok(vec![]);
    };

    match run.parent_run_id {
        Some(parent) if aggregate_to_parent => Ok(vec![parent]),
        _ => Ok(vec![run_id]),
    }
}

/// Run-parent when aggregating over a run that has children.
async fn choose_table(
    facts: &dyn FactStore,
    runs: &[Uuid],
    aggregate_to_parent: bool,
) -> Result<ProjectionTable> {
    if aggregate_to_parent {
        for run_id in runs {
            if facts.has_children(*run_id).await? {
                return Ok(ProjectionTable::RunParent);
            }
        }
    }
    Ok(ProjectionTable::Run)
}

struct RunTraversal<'a> {
    projections: &'a dyn ProjectionStore,
    table: ProjectionTable,
    builder: GraphBuilder,
    seen_runs: HashSet<Uuid>,
    seen_versions: HashSet<Uuid>,
}

impl<'a> RunTraversal<'a> {
    fn new(projections: &'a dyn ProjectionStore, table: ProjectionTable) -> Self {
        Self {
            projections,
            table,
            builder: GraphBuilder::new(),
            seen_runs: HashSet::new(),
            seen_versions: HashSet::new(),
        }
    }

    async fn run(&mut self, start: Vec<Uuid>, depth: u32) -> Result<()> {
        let mut run_frontier = Vec::new();
        for run_id in start {
            if self.seen_runs.insert(run_id) {
                self.builder.add_node(NodeId::Run(run_id), None);
                run_frontier.push(run_id);
            }
        }

        let mut distance = 0;
        while !run_frontier.is_empty() && distance < depth {
            let version_frontier = self.expand_runs(&run_frontier).await?;
            distance += 1;
            if version_frontier.is_empty() || distance >= depth {
                break;
            }
            run_frontier = self.expand_versions(&version_frontier).await?;
            distance += 1;
        }
        Ok(())
    }

    /// Add every input and output of `runs`; returns versions not seen before.
    async fn expand_runs(&mut self, runs: &[Uuid]) -> Result<Vec<Uuid>> {
        let rows = self.projections.rows_for_keys(self.table, runs).await?;

        let mut next = Vec::new();
        for row in &rows {
            let run_node = self.add_run(row);
            if let Some(input) = &row.input {
                let version_node = self.add_version(input, &mut next);
                self.builder.add_edge(version_node, run_node.clone());
            }
            if let Some(output) = &row.output {
                let version_node = self.add_version(output, &mut next);
                self.builder.add_edge(run_node.clone(), version_node);
            }
        }
        Ok(next)
    }

    /// Add every run consuming or producing `versions`; returns runs not seen before.
    async fn expand_versions(&mut self, versions: &[Uuid]) -> Result<Vec<Uuid>> {
        let consuming = self.projections.rows_consuming(self.table, versions).await?;
        let producing = self.projections.rows_producing(self.table, versions).await?;

        let mut next = BTreeSet::new();
        for row in &consuming {
            let run_node = self.add_run(row);
            self.track_run(row, &mut next);
            if let Some(input) = &row.input {
                self.builder.add_edge(version_id(input), run_node);
            }
        }
        for row in &producing {
            let run_node = self.add_run(row);
            self.track_run(row, &mut next);
            if let Some(output) = &row.output {
                self.builder.add_edge(run_node, version_id(output));
            }
        }
        Ok(next.into_iter().collect())
    }

    /// Node for the row's key run. Data is taken only from the key run's
    /// own rows; aggregated child rows describe a different run.
    fn add_run(&mut self, row: &ProjectionRow) -> NodeId {
        let key = row.key(self.table);
        let node = NodeId::Run(key);
        let data = (row.run_id == key).then(|| NodeData::Run(RunData::from_row(row)));
        self.builder.add_node(node.clone(), data);
        node
    }

    fn track_run(&mut self, row: &ProjectionRow, next: &mut BTreeSet<Uuid>) {
        let key = row.key(self.table);
        if self.seen_runs.insert(key) {
            next.insert(key);
        }
    }

    fn add_version(&mut self, version: &VersionRef, next: &mut Vec<Uuid>) -> NodeId {
        let node = version_id(version);
        self.builder.add_node(
            node.clone(),
            Some(NodeData::DatasetVersion(DatasetVersionData::from(version))),
        );
        if self.seen_versions.insert(version.id) {
            next.push(version.id);
        }
        node
    }
}

fn version_id(version: &VersionRef) -> NodeId {
    NodeId::dataset_version(&version.namespace, &version.name, version.version)
}

/// Fill run nodes the projection could not describe (never refreshed, or
/// parents seen only through their children's rows) from the facts.
async fn fill_run_data(facts: &dyn FactStore, builder: &mut GraphBuilder) -> Result<()> {
    for node in builder.missing_data() {
        let NodeId::Run(run_id) = node else {
            continue;
        };
        if let Some(run) = facts.get_run(run_id).await? {
            builder.add_node(node, Some(NodeData::Run(RunData::from(&run))));
        }
    }
    Ok(())
}
