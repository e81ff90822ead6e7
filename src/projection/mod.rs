//! Projection maintenance.
//!
//! Keeps the two denormalized lineage tables in step with run facts. Every
//! refresh replaces a run's rows wholesale (delete then insert) inside one
//! store transaction, so repeating a refresh is always safe.
//!
//! Run-parent rows are keyed by the aggregating parent:
//! - a run with children aggregates under itself
//! - otherwise a run with a parent contributes under that parent, and the
//!   parent's own rows are rebuilt alongside so the aggregate does not
//!   depend on refresh order
//! - a run with neither contributes nothing

mod rows;

pub use rows::project_rows;

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{ProjectionRow, RunRecord};
use crate::storage::{
    FactStore, ParentContribution, ProjectionRefresh, ProjectionStore, StorageError, Stores,
};
use crate::utils::retry::RetryConfig;

/// Errors from refreshing a run's projection.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProjectionError {
    fn is_conflict(&self) -> bool {
        matches!(self, ProjectionError::Storage(e) if e.is_conflict())
    }

    /// Worth retrying later (upstream redelivery or the next backfill).
    pub fn is_transient(&self) -> bool {
        matches!(self, ProjectionError::Storage(e) if e.is_transient())
    }
}

/// What a refresh wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub run_id: Uuid,
    pub run_rows: usize,
    pub parent_rows: usize,
    /// Parent whose own rows were rebuilt alongside.
    pub rebuilt_parent: Option<Uuid>,
}

/// Rebuilds run and run-parent projection rows from facts.
#[derive(Clone)]
pub struct ProjectionMaintainer {
    facts: Arc<dyn FactStore>,
    projections: Arc<dyn ProjectionStore>,
    retry: RetryConfig,
}

impl ProjectionMaintainer {
    pub fn new(stores: &Stores, retry: RetryConfig) -> Self {
        Self {
            facts: stores.facts.clone(),
            projections: stores.projections.clone(),
            retry,
        }
    }

    /// Replace all projection rows of `run_id` with rows computed from
    /// current facts.
    ///
    /// Facts that change between reading and writing surface as a store
    /// conflict; the refresh is then recomputed, with backoff, up to the
    /// configured retry limit. Other failures, including a missing
    /// partition, are returned and leave prior rows untouched.
    pub async fn refresh(&self, run_id: Uuid) -> Result<RefreshSummary, ProjectionError> {
        let result = (|| self.refresh_once(run_id))
            .retry(self.retry.backoff())
            .when(ProjectionError::is_conflict)
            .notify(|err: &ProjectionError, dur: Duration| {
                debug!(%run_id, error = %err, delay = ?dur, "Refresh conflict, recomputing");
            })
            .await;

        match &result {
            Ok(summary) => debug!(
                %run_id,
                run_rows = summary.run_rows,
                parent_rows = summary.parent_rows,
                "Projection refreshed"
            ),
            Err(e) => warn!(%run_id, error = %e, "Projection refresh failed"),
        }
        result
    }

    async fn refresh_once(&self, run_id: Uuid) -> Result<RefreshSummary, ProjectionError> {
        let plan = self.plan(run_id).await?;
        let summary = RefreshSummary {
            run_id,
            run_rows: plan.run_rows.len(),
            parent_rows: plan.parent_rows.len(),
            rebuilt_parent: plan.parent_contribution.as_ref().map(|p| p.parent_id),
        };
        self.projections.apply_refresh(plan).await?;
        Ok(summary)
    }

    /// Compute the replacement rows for `run_id` without writing them.
    pub async fn plan(&self, run_id: Uuid) -> Result<ProjectionRefresh, ProjectionError> {
        let run = self
            .facts
            .get_run(run_id)
            .await?
            .ok_or(ProjectionError::RunNotFound(run_id))?;

        let run_rows = self.own_rows(&run, run.parent_run_id).await?;

        let (parent_rows, parent_contribution) = if self.facts.has_children(run_id).await? {
            (keyed_under(&run_rows, run_id), None)
        } else if let Some(parent_id) = run.parent_run_id {
            let contribution = self.parent_contribution(run_id, parent_id).await?;
            (keyed_under(&run_rows, parent_id), contribution)
        } else {
            (vec![], None)
        };

        Ok(ProjectionRefresh {
            run_id,
            observed_updated_at: run.updated_at,
            run_rows,
            parent_rows,
            parent_contribution,
        })
    }

    async fn own_rows(
        &self,
        run: &RunRecord,
        parent_run_id: Option<Uuid>,
    ) -> Result<Vec<ProjectionRow>, ProjectionError> {
        let inputs = self.facts.run_inputs(run.id).await?;
        let outputs = self.facts.run_outputs(run.id).await?;
        Ok(project_rows(run, &inputs, &outputs, parent_run_id))
    }

    /// The parent's own run-parent rows, keyed under itself.
    async fn parent_contribution(
        &self,
        child_id: Uuid,
        parent_id: Uuid,
    ) -> Result<Option<ParentContribution>, ProjectionError> {
        let Some(parent) = self.facts.get_run(parent_id).await? else {
            warn!(run_id = %child_id, %parent_id, "Parent run not found; skipping its rows");
            return Ok(None);
        };
        Ok(Some(ParentContribution {
            parent_id,
            observed_updated_at: parent.updated_at,
            rows: self.own_rows(&parent, Some(parent_id)).await?,
        }))
    }
}

fn keyed_under(rows: &[ProjectionRow], parent_id: Uuid) -> Vec<ProjectionRow> {
    rows.iter()
        .cloned()
        .map(|mut row| {
            row.parent_run_id = Some(parent_id);
            row
        })
        .collect()
}
