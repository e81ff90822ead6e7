//! Denormalized projection rows.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::facts::{RunState, VersionRef};

/// The two precomputed lineage tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectionTable {
    /// One run's own inputs/outputs, keyed by run id.
    Run,
    /// Child contributions aggregated under the parent run id.
    RunParent,
}

impl ProjectionTable {
    pub const ALL: [ProjectionTable; 2] = [ProjectionTable::Run, ProjectionTable::RunParent];

    pub fn table_name(&self) -> &'static str {
        match self {
            ProjectionTable::Run => "run_lineage_denormalized",
            ProjectionTable::RunParent => "run_parent_lineage_denormalized",
        }
    }
}

impl fmt::Display for ProjectionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// One (run, input-version, output-version) tuple.
///
/// In the run table `parent_run_id` is the run's own parent. In the
/// run-parent table it is the aggregating parent the row is keyed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionRow {
    pub run_id: Uuid,
    pub namespace: String,
    pub job_name: String,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub job_id: Uuid,
    pub job_version_id: Option<Uuid>,
    pub input: Option<VersionRef>,
    pub output: Option<VersionRef>,
    pub parent_run_id: Option<Uuid>,
    pub run_date: NaiveDate,
}

impl ProjectionRow {
    /// Run id this row is looked up by in `table`.
    pub fn key(&self, table: ProjectionTable) -> Uuid {
        match table {
            ProjectionTable::Run => self.run_id,
            ProjectionTable::RunParent => self.parent_run_id.unwrap_or(self.run_id),
        }
    }

    pub fn input_version_id(&self) -> Option<Uuid> {
        self.input.as_ref().map(|v| v.id)
    }

    pub fn output_version_id(&self) -> Option<Uuid> {
        self.output.as_ref().map(|v| v.id)
    }
}
