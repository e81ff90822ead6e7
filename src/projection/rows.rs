//! Row assembly for the denormalized lineage tables.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::model::{ProjectionRow, RunRecord, VersionRef};

/// One row per (input, output) pair of `run`, an empty side counting as a
/// single null. Duplicate versions collapse; rows come out sorted by
/// (input, output).
pub fn project_rows(
    run: &RunRecord,
    inputs: &[VersionRef],
    outputs: &[VersionRef],
    parent_run_id: Option<Uuid>,
) -> Vec<ProjectionRow> {
    let inputs = side(inputs);
    let outputs = side(outputs);
    let run_date = run.run_date();

    let mut rows = Vec::with_capacity(inputs.len() * outputs.len());
    for input in &inputs {
        for output in &outputs {
            rows.push(ProjectionRow {
                run_id: run.id,
                namespace: run.namespace.clone(),
                job_name: run.job_name.clone(),
                state: run.state,
                created_at: run.created_at,
                updated_at: run.updated_at,
                started_at: run.started_at,
                ended_at: run.ended_at,
                job_id: run.job_id,
                job_version_id: run.job_version_id,
                input: input.clone(),
                output: output.clone(),
                parent_run_id,
                run_date,
            });
        }
    }
    rows
}

fn side(versions: &[VersionRef]) -> Vec<Option<VersionRef>> {
    if versions.is_empty() {
        return vec![None];
    }
    versions
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(Some)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunState;
    use crate::test_utils::{date, ts};

    fn run() -> RunRecord {
        RunRecord {
            id: Uuid::from_u128(1),
            job_id: Uuid::from_u128(2),
            job_version_id: None,
            namespace: "ns".into(),
            job_name: "job".into(),
            state: RunState::Running,
            created_at: ts(2026, 2, 28),
            updated_at: ts(2026, 3, 1),
            started_at: Some(ts(2026, 3, 1)),
            ended_at: None,
            parent_run_id: None,
        }
    }

    fn version(n: u128) -> VersionRef {
        VersionRef {
            id: Uuid::from_u128(100 + n),
            namespace: "ns".into(),
            name: format!("table_{n}"),
            version: Uuid::from_u128(200 + n),
        }
    }

    #[test]
    fn test_no_io_yields_one_null_row() {
        let rows = project_rows(&run(), &[], &[], None);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].input.is_none() && rows[0].output.is_none());
        assert_eq!(rows[0].run_date, date(2026, 3, 1));
    }

    #[test]
    fn test_cross_product_of_inputs_and_outputs() {
        let rows = project_rows(
            &run(),
            &[version(1), version(2)],
            &[version(3), version(4), version(5)],
            None,
        );
        assert_eq!(rows.len(), 6);
        let pairs: BTreeSet<_> = rows
            .iter()
            .map(|r| (r.input_version_id(), r.output_version_id()))
            .collect();
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn test_one_empty_side_is_null() {
        let rows = project_rows(&run(), &[], &[version(1), version(2)], None);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.input.is_none()));
    }

    #[test]
    fn test_duplicate_versions_collapse() {
        let rows = project_rows(&run(), &[version(1), version(1)], &[], None);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_parent_column_is_caller_supplied() {
        let parent = Uuid::from_u128(9);
        let rows = project_rows(&run(), &[], &[version(1)], Some(parent));
        assert_eq!(rows[0].parent_run_id, Some(parent));
    }
}
