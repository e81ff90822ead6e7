use super::*;
use crate::model::{ProjectionRow, RunState};
use crate::storage::ParentContribution;
use crate::test_utils::{date, ts, LineageFixture};

fn row_for(run: &RunRecord, output: Option<VersionRef>) -> ProjectionRow {
    ProjectionRow {
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
        input: None,
        output,
        parent_run_id: run.parent_run_id,
        run_date: run.run_date(),
    }
}

fn refresh_of(run: &RunRecord, rows: Vec<ProjectionRow>) -> ProjectionRefresh {
    ProjectionRefresh {
        run_id: run.id,
        observed_updated_at: run.updated_at,
        run_rows: rows,
        parent_rows: vec![],
        parent_contribution: None,
    }
}

#[tokio::test]
async fn test_refresh_without_partition_fails_and_keeps_state() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let run = fx.run(&job, ts(2026, 3, 5)).await;

    let err = fx
        .store
        .apply_refresh(refresh_of(&run, vec![row_for(&run, None)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::NoPartition {
            table: ProjectionTable::Run,
            run_date
        } if run_date == date(2026, 3, 5)
    ));
    assert!(fx.store.rows(ProjectionTable::Run).await.is_empty());

    fx.partition_for(date(2026, 3, 1)).await;
    fx.store
        .apply_refresh(refresh_of(&run, vec![row_for(&run, None)]))
        .await
        .unwrap();
    assert_eq!(fx.store.rows(ProjectionTable::Run).await.len(), 1);
}

#[tokio::test]
async fn test_failed_parent_partition_check_rolls_back_whole_refresh() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let run = fx.run(&job, ts(2026, 3, 5)).await;
    fx.store
        .create_partition(ProjectionTable::Run, PartitionMonth::of(date(2026, 3, 5)))
        .await
        .unwrap();

    fx.store
        .apply_refresh(refresh_of(&run, vec![row_for(&run, None)]))
        .await
        .unwrap();

    // Run table partition exists, run-parent does not: nothing may change.
    let mut refresh = refresh_of(&run, vec![row_for(&run, None), row_for(&run, None)]);
    refresh.parent_rows = vec![row_for(&run, None)];
    let err = fx.store.apply_refresh(refresh).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::NoPartition {
            table: ProjectionTable::RunParent,
            ..
        }
    ));
    assert_eq!(fx.store.rows(ProjectionTable::Run).await.len(), 1);
}

#[tokio::test]
async fn test_stale_refresh_is_a_conflict() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let run = fx.run(&job, ts(2026, 3, 5)).await;
    fx.partition_for(date(2026, 3, 5)).await;

    let stale = refresh_of(&run, vec![row_for(&run, None)]);
    fx.transition(&run, RunState::Failed, ts(2026, 3, 6)).await;

    let err = fx.store.apply_refresh(stale).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_stale_parent_contribution_is_a_conflict() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let parent = fx.run(&job, ts(2026, 3, 5)).await;
    let child = fx.child_run(&job, &parent, ts(2026, 3, 5)).await;
    fx.partition_for(date(2026, 3, 5)).await;

    let mut refresh = refresh_of(&child, vec![row_for(&child, None)]);
    refresh.parent_contribution = Some(ParentContribution {
        parent_id: parent.id,
        observed_updated_at: ts(2020, 1, 1),
        rows: vec![row_for(&parent, None)],
    });

    let err = fx.store.apply_refresh(refresh).await.unwrap_err();
    assert!(matches!(err, StorageError::RefreshConflict { run_id } if run_id == parent.id));
}

#[tokio::test]
async fn test_refresh_replaces_only_own_rows() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let a = fx.run(&job, ts(2026, 3, 5)).await;
    let b = fx.run(&job, ts(2026, 3, 6)).await;
    fx.partition_for(date(2026, 3, 1)).await;

    fx.store
        .apply_refresh(refresh_of(&a, vec![row_for(&a, None), row_for(&a, None)]))
        .await
        .unwrap();
    fx.store
        .apply_refresh(refresh_of(&b, vec![row_for(&b, None)]))
        .await
        .unwrap();
    fx.store
        .apply_refresh(refresh_of(&a, vec![row_for(&a, None)]))
        .await
        .unwrap();

    let rows = fx.store.rows(ProjectionTable::Run).await;
    assert_eq!(rows.iter().filter(|r| r.run_id == a.id).count(), 1);
    assert_eq!(rows.iter().filter(|r| r.run_id == b.id).count(), 1);
}

#[tokio::test]
async fn test_injected_failure_is_transient() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let run = fx.run(&job, ts(2026, 3, 5)).await;
    fx.partition_for(date(2026, 3, 5)).await;
    fx.store.fail_refresh_for(run.id).await;

    let err = fx
        .store
        .apply_refresh(refresh_of(&run, vec![row_for(&run, None)]))
        .await
        .unwrap_err();
    assert!(err.is_transient());

    fx.store.clear_refresh_failures().await;
    assert!(fx
        .store
        .apply_refresh(refresh_of(&run, vec![row_for(&run, None)]))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_partition_create_and_drop_are_idempotent() {
    let store = MemoryStore::new();
    let march = PartitionMonth::of(date(2026, 3, 1));

    assert!(store.create_partition(ProjectionTable::Run, march).await.unwrap());
    assert!(!store.create_partition(ProjectionTable::Run, march).await.unwrap());
    assert_eq!(
        store.list_partitions(ProjectionTable::Run).await.unwrap(),
        vec![march]
    );

    assert!(store.drop_partition(ProjectionTable::Run, march).await.unwrap());
    assert!(!store.drop_partition(ProjectionTable::Run, march).await.unwrap());
    assert!(store
        .list_partitions(ProjectionTable::Run)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_drop_partition_removes_its_rows_and_stats_count_rows() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let march = fx.run(&job, ts(2026, 3, 5)).await;
    let april = fx.run(&job, ts(2026, 4, 5)).await;
    fx.partition_for(date(2026, 3, 1)).await;
    fx.partition_for(date(2026, 4, 1)).await;

    for run in [&march, &april] {
        fx.store
            .apply_refresh(refresh_of(run, vec![row_for(run, None)]))
            .await
            .unwrap();
    }

    let stats = fx.store.partition_stats(ProjectionTable::Run).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.row_estimate == 1));

    fx.store
        .drop_partition(ProjectionTable::Run, PartitionMonth::of(date(2026, 3, 1)))
        .await
        .unwrap();
    let rows = fx.store.rows(ProjectionTable::Run).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run_id, april.id);
}

#[tokio::test]
async fn test_run_keys_page_is_newest_first_and_resumes_after_cursor() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let mut runs = Vec::new();
    for day in 1..=5 {
        runs.push(fx.run(&job, ts(2026, 3, day)).await);
    }

    let first = fx.store.run_keys_page(None, 2).await.unwrap();
    assert_eq!(
        first.iter().map(|k| k.id).collect::<Vec<_>>(),
        vec![runs[4].id, runs[3].id]
    );

    let second = fx.store.run_keys_page(first.last(), 2).await.unwrap();
    assert_eq!(
        second.iter().map(|k| k.id).collect::<Vec<_>>(),
        vec![runs[2].id, runs[1].id]
    );

    let third = fx.store.run_keys_page(second.last(), 2).await.unwrap();
    assert_eq!(third.len(), 1);
    assert!(fx.store.run_keys_page(third.last(), 2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_job_edges_derive_from_run_io() {
    let fx = LineageFixture::new();
    let producer = fx.job("ns", "producer").await;
    let consumer = fx.job("ns", "consumer").await;
    let dataset = fx.dataset("ns", "table").await;

    let p = fx.run(&producer, ts(2026, 3, 1)).await;
    let version = fx.produce(&p, &dataset).await;
    let c = fx.run(&consumer, ts(2026, 3, 2)).await;
    fx.consume(&c, &version).await;

    let edges = fx.store.edges_for_datasets(&[dataset.id]).await.unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.contains(&JobDatasetEdge {
        job_id: producer.id,
        dataset_id: dataset.id,
        direction: EdgeDirection::Output,
    }));
    assert!(edges.contains(&JobDatasetEdge {
        job_id: consumer.id,
        dataset_id: dataset.id,
        direction: EdgeDirection::Input,
    }));

    let consumer_edges = fx.store.edges_for_jobs(&[consumer.id]).await.unwrap();
    assert_eq!(consumer_edges.len(), 1);
}

#[tokio::test]
async fn test_latest_runs_one_per_job() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let other = fx.job("ns", "other").await;
    fx.run(&job, ts(2026, 3, 1)).await;
    let newest = fx.run(&job, ts(2026, 3, 9)).await;
    fx.run(&job, ts(2026, 3, 4)).await;

    let latest = fx.store.latest_runs(&[job.id, other.id]).await.unwrap();
    assert_eq!(latest, vec![newest]);
}

#[tokio::test]
async fn test_has_children_and_counts() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "job").await;
    let parent = fx.run(&job, ts(2026, 3, 1)).await;
    let child = fx.child_run(&job, &parent, ts(2026, 3, 1)).await;

    assert!(fx.store.has_children(parent.id).await.unwrap());
    assert!(!fx.store.has_children(child.id).await.unwrap());
    assert_eq!(fx.store.count_runs().await.unwrap(), 2);
    assert_eq!(fx.store.estimate_run_count().await.unwrap(), None);

    fx.store.set_run_count_estimate(Some(1_000_000)).await;
    assert_eq!(
        fx.store.estimate_run_count().await.unwrap(),
        Some(1_000_000)
    );
}
