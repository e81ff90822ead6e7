//! Job/Dataset traversal over Job↔Dataset edges.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;
use uuid::Uuid;

use crate::model::{
    DatasetData, EdgeDirection, Graph, GraphBuilder, JobData, JobDatasetEdge, NodeData, NodeId,
};
use crate::storage::{FactStore, Result};

pub(super) async fn lineage(facts: &dyn FactStore, node: &NodeId, depth: u32) -> Result<Graph> {
    let mut traversal = JobTraversal::default();

    match node {
        NodeId::Job(name) => {
            let Some(job) = facts.find_job(&name.namespace, &name.name).await? else {
                warn!(node = %node, "Job not found");
                return Ok(Graph::single(node.clone(), None));
            };
            traversal.start_job(job.id);
        }
        NodeId::Dataset(name) => {
            let Some(dataset) = facts.find_dataset(&name.namespace, &name.name).await? else {
                warn!(node = %node, "Dataset not found");
                return Ok(Graph::single(node.clone(), None));
            };
            let edges = facts.edges_for_datasets(&[dataset.id]).await?;
            let Some(job_id) = resolve_job(&edges) else {
                return Ok(Graph::single(
                    node.clone(),
                    Some(NodeData::Dataset(DatasetData::from(&dataset))),
                ));
            };
            traversal.start_job(job_id);
            traversal.start_dataset(dataset.id);
        }
        NodeId::Run(_) | NodeId::DatasetVersion { .. } => return Ok(Graph::empty()),
    }

    traversal.run(facts, depth).await?;
    traversal.into_graph(facts).await
}

/// Producing job if any, else consuming job; lowest id wins.
fn resolve_job(edges: &[JobDatasetEdge]) -> Option<Uuid> {
    let pick = |direction| {
        edges
            .iter()
            .filter(|e| e.direction == direction)
            .map(|e| e.job_id)
            .min()
    };
    pick(EdgeDirection::Output).or_else(|| pick(EdgeDirection::Input))
}

#[derive(Default)]
struct JobTraversal {
    jobs: BTreeSet<Uuid>,
    datasets: BTreeSet<Uuid>,
    expanded_jobs: BTreeSet<Uuid>,
    job_frontier: Vec<Uuid>,
    dataset_frontier: Vec<Uuid>,
    edges: BTreeSet<JobDatasetEdge>,
}

impl JobTraversal {
    fn start_job(&mut self, id: Uuid) {
        if self.jobs.insert(id) {
            self.job_frontier.push(id);
        }
    }

    fn start_dataset(&mut self, id: Uuid) {
        if self.datasets.insert(id) {
            self.dataset_frontier.push(id);
        }
    }

    fn frontier_is_empty(&self) -> bool {
        self.job_frontier.is_empty() && self.dataset_frontier.is_empty()
    }

    async fn run(&mut self, facts: &dyn FactStore, depth: u32) -> Result<()> {
        let mut distance = 0;
        while distance < depth && !self.frontier_is_empty() {
            let jobs = std::mem::take(&mut self.job_frontier);
            let datasets = std::mem::take(&mut self.dataset_frontier);

            let mut found = Vec::new();
            if !jobs.is_empty() {
                found.extend(facts.edges_for_jobs(&jobs).await?);
                self.expanded_jobs.extend(jobs);
            }
            if !datasets.is_empty() {
                found.extend(facts.edges_for_datasets(&datasets).await?);
            }

            for edge in found {
                self.start_job(edge.job_id);
                self.start_dataset(edge.dataset_id);
                self.edges.insert(edge);
            }
            distance += 1;
        }

        // Jobs reached on the last hop were never expanded; their edges to
        // datasets already in the graph still belong in the output.
        let boundary: Vec<Uuid> = self.jobs.difference(&self.expanded_jobs).copied().collect();
        if !boundary.is_empty() {
            for edge in facts.edges_for_jobs(&boundary).await? {
                if self.datasets.contains(&edge.dataset_id) {
                    self.edges.insert(edge);
                }
            }
        }
        Ok(())
    }

    async fn into_graph(self, facts: &dyn FactStore) -> Result<Graph> {
        let job_ids: Vec<Uuid> = self.jobs.into_iter().collect();
        let dataset_ids: Vec<Uuid> = self.datasets.into_iter().collect();

        let latest: HashMap<Uuid, _> = facts
            .latest_runs(&job_ids)
            .await?
            .into_iter()
            .map(|run| (run.job_id, run))
            .collect();

        let mut builder = GraphBuilder::new();
        let mut job_nodes = HashMap::new();
        for job in facts.jobs_by_id(&job_ids).await? {
            let id = NodeId::job(&job.namespace, &job.name);
            let data = JobData::new(&job, latest.get(&job.id));
            builder.add_node(id.clone(), Some(NodeData::Job(data)));
            job_nodes.insert(job.id, id);
        }

        let mut dataset_nodes = HashMap::new();
        for dataset in facts.datasets_by_id(&dataset_ids).await? {
            let id = NodeId::dataset(&dataset.namespace, &dataset.name);
            builder.add_node(id.clone(), Some(NodeData::Dataset(DatasetData::from(&dataset))));
            dataset_nodes.insert(dataset.id, id);
        }

        for edge in &self.edges {
            let (Some(job), Some(dataset)) =
                (job_nodes.get(&edge.job_id), dataset_nodes.get(&edge.dataset_id))
            else {
                continue;
            };
            match edge.direction {
                EdgeDirection::Input => builder.add_edge(dataset.clone(), job.clone()),
                EdgeDirection::Output => builder.add_edge(job.clone(), dataset.clone()),
            }
        }

        Ok(builder.build())
    }
}
