use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_VARS: [&str; 4] = [
    CONFIG_ENV_VAR,
    "TRIBUTARY__BACKFILL__CHUNK_SIZE",
    "TRIBUTARY__STORAGE__TYPE",
    "TRIBUTARY__PARTITIONS__RETENTION_MONTHS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.storage.storage_type, StorageType::Postgres);
    assert_eq!(config.lineage.default_depth, 20);
    assert_eq!(config.backfill.chunk_size, 1000);
    assert_eq!(config.retry.max_retries, 5);
}

#[test]
fn test_config_for_test_uses_memory() {
    assert_eq!(Config::for_test().storage.storage_type, StorageType::Memory);
}

#[test]
#[serial]
fn test_load_from_explicit_path() {
    clear_env();
    let file = yaml_file(
        r#"
storage:
  type: memory
lineage:
  max_depth: 40
partitions:
  lookahead_months: 6
  retention_months: 24
backfill:
  large_dataset_threshold: 5000
"#,
    );

    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.storage.storage_type, StorageType::Memory);
    assert_eq!(config.lineage.max_depth, 40);
    assert_eq!(config.lineage.default_depth, 20);
    assert_eq!(config.partitions.lookahead_months, 6);
    assert_eq!(config.partitions.retention_months, Some(24));
    assert_eq!(config.backfill.large_dataset_threshold, 5000);
    assert_eq!(config.backfill.chunk_size, 1000);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let file = yaml_file("backfill:\n  chunk_size: 250\n");
    std::env::set_var(CONFIG_ENV_VAR, file.path());
    std::env::set_var("TRIBUTARY__BACKFILL__CHUNK_SIZE", "50");
    std::env::set_var("TRIBUTARY__PARTITIONS__RETENTION_MONTHS", "18");

    let config = Config::load(None);
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.backfill.chunk_size, 50);
    assert_eq!(config.partitions.retention_months, Some(18));
}

#[test]
#[serial]
fn test_missing_required_file_is_an_error() {
    clear_env();
    assert!(Config::load(Some("/nonexistent/tributary.yaml")).is_err());
}
