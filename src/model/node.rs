//! Polymorphic lineage node identifiers.
//!
//! String forms:
//! - `dataset:<namespace>:<name>`
//! - `job:<namespace>:<name>`
//! - `datasetVersion:<namespace>:<name>#<version>`
//! - `run:<uuid>`
//!
//! The namespace may not contain `:`. Names may; everything after the
//! namespace separator belongs to the name (up to the last `#` for versions).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DATASET_PREFIX: &str = "dataset";
const DATASET_VERSION_PREFIX: &str = "datasetVersion";
const JOB_PREFIX: &str = "job";
const RUN_PREFIX: &str = "run";

/// Errors from parsing a node id string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeIdError {
    #[error("node id is empty")]
    Empty,

    #[error("unknown node type '{0}'")]
    UnknownType(String),

    #[error("malformed {kind} node id '{raw}': {reason}")]
    Malformed {
        kind: &'static str,
        raw: String,
        reason: &'static str,
    },

    #[error("invalid uuid '{value}' in node id '{raw}'")]
    InvalidUuid { raw: String, value: String },
}

/// Namespace-qualified name of a job or dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    pub namespace: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Discriminator for the four node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Dataset,
    DatasetVersion,
    Job,
    Run,
}

/// Identity of a lineage node.
///
/// Variant order is the output sort order: graphs list datasets, then
/// dataset versions, jobs and runs, each sorted by identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NodeId {
    Dataset(QualifiedName),
    DatasetVersion {
        dataset: QualifiedName,
        version: Uuid,
    },
    Job(QualifiedName),
    Run(Uuid),
}

impl NodeId {
    pub fn dataset(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        NodeId::Dataset(QualifiedName::new(namespace, name))
    }

    pub fn job(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        NodeId::Job(QualifiedName::new(namespace, name))
    }

    pub fn dataset_version(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: Uuid,
    ) -> Self {
        NodeId::DatasetVersion {
            dataset: QualifiedName::new(namespace, name),
            version,
        }
    }

    pub fn run(id: Uuid) -> Self {
        NodeId::Run(id)
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeId::Dataset(_) => NodeType::Dataset,
            NodeId::DatasetVersion { .. } => NodeType::DatasetVersion,
            NodeId::Job(_) => NodeType::Job,
            NodeId::Run(_) => NodeType::Run,
        }
    }

    /// True for the variants answered from the run projections.
    pub fn is_run_scoped(&self) -> bool {
        matches!(self, NodeId::Run(_) | NodeId::DatasetVersion { .. })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Dataset(name) => write!(f, "{DATASET_PREFIX}:{name}"),
            NodeId::DatasetVersion { dataset, version } => {
                write!(f, "{DATASET_VERSION_PREFIX}:{dataset}#{version}")
            }
            NodeId::Job(name) => write!(f, "{JOB_PREFIX}:{name}"),
            NodeId::Run(id) => write!(f, "{RUN_PREFIX}:{id}"),
        }
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().is_empty() {
            return Err(NodeIdError::Empty);
        }

        let (kind, rest) = raw.split_once(':').ok_or_else(|| match raw {
            DATASET_PREFIX | DATASET_VERSION_PREFIX | JOB_PREFIX | RUN_PREFIX => {
                NodeIdError::Malformed {
                    kind: "node",
                    raw: raw.to_string(),
                    reason: "missing identity after type",
                }
            }
            other => NodeIdError::UnknownType(other.to_string()),
        })?;

        match kind {
            DATASET_PREFIX => parse_qualified("dataset", raw, rest).map(NodeId::Dataset),
            JOB_PREFIX => parse_qualified("job", raw, rest).map(NodeId::Job),
            DATASET_VERSION_PREFIX => {
                let (name_part, version) =
                    rest.rsplit_once('#').ok_or_else(|| NodeIdError::Malformed {
                        kind: "datasetVersion",
                        raw: raw.to_string(),
                        reason: "missing '#<version>'",
                    })?;
                let dataset = parse_qualified("datasetVersion", raw, name_part)?;
                let version = parse_uuid(raw, version)?;
                Ok(NodeId::DatasetVersion { dataset, version })
            }
            RUN_PREFIX => parse_uuid(raw, rest).map(NodeId::Run),
            other => Err(NodeIdError::UnknownType(other.to_string())),
        }
    }
}

fn parse_qualified(
    kind: &'static str,
    raw: &str,
    rest: &str,
) -> Result<QualifiedName, NodeIdError> {
    let (namespace, name) = rest.split_once(':').ok_or_else(|| NodeIdError::Malformed {
        kind,
        raw: raw.to_string(),
        reason: "expected '<namespace>:<name>'",
    })?;

    if namespace.is_empty() {
        return Err(NodeIdError::Malformed {
            kind,
            raw: raw.to_string(),
            reason: "empty namespace",
        });
    }
    if name.is_empty() {
        return Err(NodeIdError::Malformed {
            kind,
            raw: raw.to_string(),
            reason: "empty name",
        });
    }

    Ok(QualifiedName::new(namespace, name))
}

fn parse_uuid(raw: &str, value: &str) -> Result<Uuid, NodeIdError> {
    Uuid::parse_str(value).map_err(|_| NodeIdError::InvalidUuid {
        raw: raw.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dataset_and_job() {
        assert_eq!(
            "dataset:warehouse:public.orders".parse::<NodeId>().unwrap(),
            NodeId::dataset("warehouse", "public.orders")
        );
        assert_eq!(
            "job:etl:daily_orders".parse::<NodeId>().unwrap(),
            NodeId::job("etl", "daily_orders")
        );
    }

    #[test]
    fn test_name_may_contain_colons() {
        let id: NodeId = "dataset:s3:s3://bucket/key:part".parse().unwrap();
        assert_eq!(id, NodeId::dataset("s3", "s3://bucket/key:part"));
        assert_eq!(id.to_string(), "dataset:s3:s3://bucket/key:part");
    }

    #[test]
    fn test_parse_dataset_version_uses_last_hash() {
        let version = Uuid::new_v4();
        let raw = format!("datasetVersion:ns:table#with#hash#{version}");
        let id: NodeId = raw.parse().unwrap();
        assert_eq!(id, NodeId::dataset_version("ns", "table#with#hash", version));
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn test_parse_run() {
        let run = Uuid::new_v4();
        let id: NodeId = format!("run:{run}").parse().unwrap();
        assert_eq!(id, NodeId::Run(run));
        assert!(id.is_run_scoped());
    }

    #[test]
    fn test_malformed_ids_rejected() {
        assert_eq!("".parse::<NodeId>(), Err(NodeIdError::Empty));
        assert!(matches!(
            "table:ns:name".parse::<NodeId>(),
            Err(NodeIdError::UnknownType(t)) if t == "table"
        ));
        assert!(matches!(
            "dataset".parse::<NodeId>(),
            Err(NodeIdError::Malformed { .. })
        ));
        assert!(matches!(
            "dataset:onlynamespace".parse::<NodeId>(),
            Err(NodeIdError::Malformed { .. })
        ));
        assert!(matches!(
            "job::name".parse::<NodeId>(),
            Err(NodeIdError::Malformed { .. })
        ));
        assert!(matches!(
            "run:not-a-uuid".parse::<NodeId>(),
            Err(NodeIdError::InvalidUuid { .. })
        ));
        assert!(matches!(
            "datasetVersion:ns:name".parse::<NodeId>(),
            Err(NodeIdError::Malformed { .. })
        ));
    }

    #[test]
    fn test_sort_order_is_type_then_identity() {
        let run = NodeId::Run(Uuid::nil());
        let job = NodeId::job("a", "b");
        let dataset_b = NodeId::dataset("ns", "b");
        let dataset_a = NodeId::dataset("ns", "a");
        let version = NodeId::dataset_version("ns", "a", Uuid::nil());

        let mut ids = vec![
            run.clone(),
            job.clone(),
            dataset_b.clone(),
            version.clone(),
            dataset_a.clone(),
        ];
        ids.sort();
        assert_eq!(ids, vec![dataset_a, dataset_b, version, job, run]);
    }

    #[test]
    fn test_serde_uses_string_form() {
        let id = NodeId::job("etl", "load");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"job:etl:load\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
