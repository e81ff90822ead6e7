//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-process tables; nothing survives a restart.
    Memory,
    #[default]
    Postgres,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URI.
    pub uri: String,
    /// Pool size.
    pub max_connections: u32,
    /// Apply bundled migrations on startup.
    pub run_migrations: bool,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/tributary".to_string(),
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Postgres);
        assert_eq!(storage.postgres.uri, "postgres://localhost:5432/tributary");
        assert_eq!(storage.postgres.max_connections, 10);
        assert!(storage.postgres.run_migrations);
    }

    #[test]
    fn test_storage_type_is_lowercase() {
        let storage: StorageConfig = serde_yaml::from_str("type: memory").unwrap();
        assert_eq!(storage.storage_type, StorageType::Memory);
    }
}
