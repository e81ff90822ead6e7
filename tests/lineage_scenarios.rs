//! End-to-end lineage scenarios against the in-memory backend.
//!
//! Run with: cargo test --test lineage_scenarios --features test-utils

mod storage;

use tributary::backfill::{BackfillCoordinator, BackfillOutcome};
use tributary::config::{BackfillConfig, LineageConfig, PartitionConfig};
use tributary::lineage::LineageService;
use tributary::model::{Edge, NodeId, PartitionMonth, ProjectionRow, ProjectionTable};
use tributary::partition::PartitionManager;
use tributary::projection::ProjectionMaintainer;
use tributary::storage::{MemoryStore, PartitionStore};
use tributary::test_utils::{date, ts, LineageFixture};
use tributary::utils::retry::RetryConfig;

struct Services {
    lineage: LineageService,
    maintainer: ProjectionMaintainer,
    partitions: PartitionManager,
}

fn services(fx: &LineageFixture) -> Services {
    let stores = fx.stores();
    Services {
        lineage: LineageService::new(&stores, LineageConfig::default()),
        maintainer: ProjectionMaintainer::new(&stores, RetryConfig::default()),
        partitions: PartitionManager::new(&stores, PartitionConfig::default()),
    }
}

fn backfill(fx: &LineageFixture, chunk_size: usize) -> BackfillCoordinator {
    let stores = fx.stores();
    let config = BackfillConfig {
        chunk_size,
        ..Default::default()
    };
    BackfillCoordinator::new(
        &stores,
        ProjectionMaintainer::new(&stores, RetryConfig::none()),
        PartitionManager::new(&stores, PartitionConfig::default()),
        config,
    )
}

async fn snapshot(fx: &LineageFixture) -> Vec<Vec<ProjectionRow>> {
    let mut tables = Vec::new();
    for table in ProjectionTable::ALL {
        let mut rows = fx.store.rows(table).await;
        rows.sort_by_key(|r| (r.run_id, r.input_version_id(), r.output_version_id()));
        tables.push(rows);
    }
    tables
}

#[tokio::test]
async fn test_memory_partition_store() {
    println!("=== MemoryStore PartitionStore Tests ===");
    let store = MemoryStore::new();
    run_partition_store_tests!(&store);
    println!("=== All MemoryStore PartitionStore tests PASSED ===");
}

#[tokio::test]
async fn test_parent_child_refresh_then_query() {
    let fx = LineageFixture::new();
    let svc = services(&fx);
    svc.partitions.ensure_partition(date(2026, 3, 1)).await.unwrap();

    let job = fx.job("ns", "etl").await;
    let d1 = fx.dataset("ns", "raw").await;
    let d2 = fx.dataset("ns", "clean").await;
    let a = fx.run(&job, ts(2026, 3, 10)).await;
    let dv1 = fx.produce(&a, &d1).await;
    let b = fx.child_run(&job, &a, ts(2026, 3, 11)).await;
    fx.consume(&b, &dv1).await;
    let dv2 = fx.produce(&b, &d2).await;

    svc.maintainer.refresh(a.id).await.unwrap();
    svc.maintainer.refresh(b.id).await.unwrap();

    let run_rows = fx.store.rows(ProjectionTable::Run).await;
    assert_eq!(run_rows.len(), 2);
    let parent_rows = fx.store.rows(ProjectionTable::RunParent).await;
    assert_eq!(parent_rows.len(), 2);
    assert!(parent_rows.iter().all(|r| r.parent_run_id == Some(a.id)));

    let dv1_id = NodeId::dataset_version("ns", "raw", dv1.version);
    let dv2_id = NodeId::dataset_version("ns", "clean", dv2.version);

    let graph = svc
        .lineage
        .build_lineage(&format!("run:{}", b.id), 2, false)
        .await
        .unwrap();
    assert!(graph
        .edges()
        .contains(&Edge::new(NodeId::Run(a.id), dv1_id.clone())));
    assert!(graph
        .edges()
        .contains(&Edge::new(dv1_id.clone(), NodeId::Run(b.id))));

    let aggregated = svc
        .lineage
        .build_lineage(&format!("run:{}", b.id), 2, true)
        .await
        .unwrap();
    assert!(aggregated.contains(&NodeId::Run(a.id)));
    assert!(!aggregated.contains(&NodeId::Run(b.id)));
    assert!(aggregated
        .edges()
        .contains(&Edge::new(NodeId::Run(a.id), dv2_id)));

    let json = serde_json::to_value(&aggregated).unwrap();
    assert!(json["graph"].as_array().is_some_and(|nodes| !nodes.is_empty()));
}

#[tokio::test]
async fn test_job_depth_bounds() {
    let fx = LineageFixture::new();
    let svc = services(&fx);

    let producer = fx.job("warehouse", "ingest").await;
    let consumer = fx.job("warehouse", "report").await;
    let unrelated = fx.job("warehouse", "archive").await;
    let orders = fx.dataset("warehouse", "orders").await;
    let summary = fx.dataset("warehouse", "summary").await;

    let p = fx.run(&producer, ts(2026, 4, 1)).await;
    let orders_v = fx.produce(&p, &orders).await;
    let c = fx.run(&consumer, ts(2026, 4, 2)).await;
    fx.consume(&c, &orders_v).await;
    let summary_v = fx.produce(&c, &summary).await;
    let u = fx.run(&unrelated, ts(2026, 4, 3)).await;
    fx.consume(&u, &summary_v).await;

    let depth1 = svc
        .lineage
        .build_lineage("job:warehouse:ingest", 1, false)
        .await
        .unwrap();
    assert_eq!(
        depth1.ids(),
        vec![
            NodeId::dataset("warehouse", "orders"),
            NodeId::job("warehouse", "ingest")
        ]
    );

    let depth2 = svc
        .lineage
        .build_lineage("job:warehouse:ingest", 2, false)
        .await
        .unwrap();
    assert!(depth2.contains(&NodeId::job("warehouse", "report")));
    assert!(!depth2.contains(&NodeId::dataset("warehouse", "summary")));
    assert!(!depth2.contains(&NodeId::job("warehouse", "archive")));

    let default_depth = svc.lineage.default_depth();
    let full = svc
        .lineage
        .build_lineage("job:warehouse:ingest", default_depth as i64, false)
        .await
        .unwrap();
    assert_eq!(full.len(), 5);
    assert_eq!(full.edges().len(), 4);
}

#[tokio::test]
async fn test_orphans_and_unknowns_never_error() {
    let fx = LineageFixture::new();
    let svc = services(&fx);
    fx.dataset("ns", "lonely").await;

    let orphan = svc
        .lineage
        .build_lineage("dataset:ns:lonely", 3, false)
        .await
        .unwrap();
    assert_eq!(orphan.len(), 1);
    assert!(orphan.nodes()[0].data.is_some());

    let unknown = svc
        .lineage
        .build_lineage("dataset:ns:missing", 3, false)
        .await
        .unwrap();
    assert_eq!(unknown.ids(), vec![NodeId::dataset("ns", "missing")]);

    assert!(svc
        .lineage
        .build_lineage(&format!("run:{}", uuid::Uuid::new_v4()), 3, true)
        .await
        .unwrap()
        .is_empty());
    assert!(svc
        .lineage
        .build_lineage("dataset:ns", 3, false)
        .await
        .is_err());
}

#[tokio::test]
async fn test_retention_keeps_current_month() {
    let fx = LineageFixture::new();
    let svc = services(&fx);

    svc.partitions
        .create_partitions_for_period(date(2025, 1, 1), 15)
        .await
        .unwrap();
    svc.partitions
        .cleanup_old_partitions_as_of(date(2026, 4, 15), 0)
        .await
        .unwrap();

    let stats = svc.partitions.stats().await.unwrap();
    let months: Vec<_> = stats
        .iter()
        .filter(|s| s.table == ProjectionTable::Run)
        .map(|s| s.month.to_string())
        .collect();
    assert_eq!(months, vec!["2026-04"]);
}

#[tokio::test]
async fn test_interrupted_backfill_converges() {
    let fx = LineageFixture::new();
    let job = fx.job("ns", "hourly").await;
    let dataset = fx.dataset("ns", "events").await;
    let root = fx.run(&job, ts(2026, 1, 1)).await;
    let mut previous = fx.produce(&root, &dataset).await;
    let mut runs = vec![root];
    for day in 2..=9 {
        let run = if day % 3 == 0 {
            fx.child_run(&job, &runs[0], ts(2026, 1 + day % 2, day)).await
        } else {
            fx.run(&job, ts(2026, 1 + day % 2, day)).await
        };
        fx.consume(&run, &previous).await;
        previous = fx.produce(&run, &dataset).await;
        runs.push(run);
    }

    // Reference: one uninterrupted backfill over a fresh copy of the facts.
    let outcome = backfill(&fx, 4).backfill(0, false).await.unwrap();
    assert!(matches!(outcome, BackfillOutcome::Completed(s) if s.failed == 0));
    let reference = snapshot(&fx).await;

    // Interrupt: wipe projections, refresh only some runs, then re-run.
    for month in [date(2026, 1, 1), date(2026, 2, 1)] {
        for table in ProjectionTable::ALL {
            fx.store
                .drop_partition(table, PartitionMonth::of(month))
                .await
                .unwrap();
        }
    }
    let partial = backfill(&fx, 4);
    let maintainer = ProjectionMaintainer::new(&fx.stores(), RetryConfig::none());
    services(&fx)
        .partitions
        .create_partitions_for_period(date(2026, 1, 1), 1)
        .await
        .unwrap();
    for run in runs.iter().rev().take(4) {
        maintainer.refresh(run.id).await.unwrap();
    }
    assert_ne!(snapshot(&fx).await, reference);

    let outcome = partial.backfill(3, false).await.unwrap();
    assert!(matches!(outcome, BackfillOutcome::Completed(s) if s.processed == 9));
    assert_eq!(snapshot(&fx).await, reference);
}
