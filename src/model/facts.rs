//! Records read from the authoritative fact tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    New,
    Running,
    Complete,
    Failed,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::New => "NEW",
            RunState::Running => "RUNNING",
            RunState::Complete => "COMPLETE",
            RunState::Failed => "FAILED",
            RunState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Complete | RunState::Failed | RunState::Aborted
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(RunState::New),
            "RUNNING" => Ok(RunState::Running),
            "COMPLETE" | "COMPLETED" => Ok(RunState::Complete),
            "FAILED" => Ok(RunState::Failed),
            "ABORTED" => Ok(RunState::Aborted),
            other => Err(format!("unknown run state '{other}'")),
        }
    }
}

/// Date a run is partitioned under: start date, else end date, else creation date (UTC).
pub fn run_date(
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
) -> NaiveDate {
    started_at.or(ended_at).unwrap_or(created_at).date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub current_version_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
}

/// Immutable dataset snapshot and the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetVersionRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub namespace: String,
    pub name: String,
    pub version: Uuid,
    pub producing_run_id: Option<Uuid>,
}

impl DatasetVersionRecord {
    pub fn to_ref(&self) -> VersionRef {
        VersionRef {
            id: self.id,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            version: self.version,
        }
    }
}

/// Resolved dataset-version identity as stored in projection rows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionRef {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub version: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_version_id: Option<Uuid>,
    pub namespace: String,
    pub job_name: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Immutable once set.
    pub parent_run_id: Option<Uuid>,
}

impl RunRecord {
    pub fn run_date(&self) -> NaiveDate {
        run_date(self.created_at, self.started_at, self.ended_at)
    }

    pub fn key(&self) -> RunKey {
        RunKey {
            id: self.id,
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Pagination cursor for run scans, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunKey {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunKey {
    pub fn run_date(&self) -> NaiveDate {
        run_date(self.created_at, self.started_at, self.ended_at)
    }

    /// True when `self` sorts strictly after `cursor` in (created_at DESC, id DESC) order.
    pub fn is_after(&self, cursor: &RunKey) -> bool {
        (self.created_at, self.id) < (cursor.created_at, cursor.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeDirection {
    /// Dataset consumed by the job.
    Input,
    /// Dataset produced by the job.
    Output,
}

impl EdgeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeDirection::Input => "INPUT",
            EdgeDirection::Output => "OUTPUT",
        }
    }
}

impl FromStr for EdgeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INPUT" => Ok(EdgeDirection::Input),
            "OUTPUT" => Ok(EdgeDirection::Output),
            other => Err(format!("unknown io type '{other}'")),
        }
    }
}

/// Job↔Dataset relation derived from the job's runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobDatasetEdge {
    pub job_id: Uuid,
    pub dataset_id: Uuid,
    pub direction: EdgeDirection,
}
