//! PartitionStore interface tests.
//!
//! These tests verify the contract of the PartitionStore trait.
//! Each storage implementation should run these tests. Every test uses its
//! own months so they can share one store.

use tributary::model::{PartitionMonth, ProjectionTable};
use tributary::storage::PartitionStore;

fn month(year: i32, month: u32) -> PartitionMonth {
    PartitionMonth::new(year, month).expect("valid month")
}

// =============================================================================
// create_partition tests
// =============================================================================

pub async fn test_create_is_idempotent<S: PartitionStore>(store: &S) {
    let m = month(2030, 1);
    for table in ProjectionTable::ALL {
        assert!(
            store.create_partition(table, m).await.unwrap(),
            "first create should report creation"
        );
        assert!(
            !store.create_partition(table, m).await.unwrap(),
            "second create should be a no-op"
        );

        let months = store.list_partitions(table).await.unwrap();
        assert_eq!(
            months.iter().filter(|x| **x == m).count(),
            1,
            "exactly one partition for the month"
        );
    }
}

pub async fn test_list_is_ascending<S: PartitionStore>(store: &S) {
    let table = ProjectionTable::Run;
    store.create_partition(table, month(2030, 9)).await.unwrap();
    store.create_partition(table, month(2030, 7)).await.unwrap();
    store.create_partition(table, month(2030, 8)).await.unwrap();

    let months = store.list_partitions(table).await.unwrap();
    let mut sorted = months.clone();
    sorted.sort();
    assert_eq!(months, sorted, "partitions should be listed in month order");
}

// =============================================================================
// drop_partition tests
// =============================================================================

pub async fn test_drop_missing_is_noop<S: PartitionStore>(store: &S) {
    for table in ProjectionTable::ALL {
        assert!(
            !store.drop_partition(table, month(2031, 5)).await.unwrap(),
            "dropping a missing partition should report false"
        );
    }
}

pub async fn test_create_then_drop<S: PartitionStore>(store: &S) {
    let m = month(2030, 2);
    let table = ProjectionTable::RunParent;
    store.create_partition(table, m).await.unwrap();

    assert!(store.drop_partition(table, m).await.unwrap());
    assert!(!store.list_partitions(table).await.unwrap().contains(&m));
    assert!(!store.drop_partition(table, m).await.unwrap());
}

// =============================================================================
// statistics tests
// =============================================================================

pub async fn test_stats_report_each_partition<S: PartitionStore>(store: &S) {
    let m = month(2030, 3);
    let table = ProjectionTable::Run;
    store.create_partition(table, m).await.unwrap();

    let stats = store.partition_stats(table).await.unwrap();
    let entry = stats
        .iter()
        .find(|s| s.month == m)
        .expect("stats should include the new partition");
    assert_eq!(entry.name, m.partition_name(table));
    assert_eq!(entry.table, table);
    assert!(entry.row_estimate <= 0, "new partition has no rows");
}

pub async fn test_analyze_succeeds<S: PartitionStore>(store: &S) {
    for table in ProjectionTable::ALL {
        store.analyze(table).await.expect("analyze should succeed");
    }
}

#[macro_export]
macro_rules! run_partition_store_tests {
    ($store:expr) => {
        use $crate::storage::partition_store_tests::*;

        // create tests
        test_create_is_idempotent($store).await;
        println!("  test_create_is_idempotent: PASSED");

        test_list_is_ascending($store).await;
        println!("  test_list_is_ascending: PASSED");

        // drop tests
        test_drop_missing_is_noop($store).await;
        println!("  test_drop_missing_is_noop: PASSED");

        test_create_then_drop($store).await;
        println!("  test_create_then_drop: PASSED");

        // statistics tests
        test_stats_report_each_partition($store).await;
        println!("  test_stats_report_each_partition: PASSED");

        test_analyze_succeeds($store).await;
        println!("  test_analyze_succeeds: PASSED");
    };
}
