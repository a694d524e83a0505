use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crate::error::{OrbisError, OrbisResult};
use crate::metadata::{DefaultValue, EntityDescriptor, EntityOperations, Operation};
use crate::storage::SqliteStorage;

/// Connection settings read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbisConfig {
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for OrbisConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 5,
                min_connections: 1,
                acquire_timeout_secs: 8,
            },
        }
    }
}

impl OrbisConfig {
    pub fn from_env() -> OrbisResult<Self> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string()),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                acquire_timeout_secs: env::var("DB_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()
                    .unwrap_or(8),
            },
        })
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.database.acquire_timeout_secs)
    }

    /// Open the configured SQLite pool.
    pub async fn connect(&self) -> OrbisResult<SqliteStorage> {
        if self.database.min_connections > self.database.max_connections {
            return Err(OrbisError::Configuration(format!(
                "DB_MIN_CONNECTIONS ({}) exceeds DB_MAX_CONNECTIONS ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        SqliteStorage::connect_with(self).await
    }
}

/// Code-level options applied to every entity unless the entity overrides them.
#[derive(Debug, Clone, Default)]
pub struct OrbisOptions {
    pub entity: EntityOptions,
}

#[derive(Debug, Clone, Default)]
pub struct EntityOptions {
    pub operations: EntityOperations,
    pub create: BTreeMap<String, DefaultValue>,
}

impl OrbisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle generation of an operation for every entity without an override.
    pub fn operation(mut self, operation: Operation, enabled: bool) -> Self {
        self.entity.operations.set(operation, enabled);
        self
    }

    /// Default applied on creation of any entity that has the field.
    pub fn create_default(mut self, field: &str, value: DefaultValue) -> Self {
        self.entity.create.insert(field.to_string(), value);
        self
    }

    pub fn create_literal(self, field: &str, value: Value) -> Self {
        self.create_default(field, DefaultValue::Literal(value))
    }

    /// Entity override first, then the global switch, enabled otherwise.
    pub fn should_generate(&self, entity: &EntityDescriptor, operation: Operation) -> bool {
        entity
            .operations
            .get(operation)
            .or_else(|| self.entity.operations.get(operation))
            .unwrap_or(true)
    }

    /// Whether a creation default covers `field` of `entity`.
    pub fn has_create_default(&self, entity: &EntityDescriptor, field: &str) -> bool {
        entity.create.contains_key(field) || self.entity.create.contains_key(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrbisConfig::default();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_connect_rejects_inverted_pool_bounds() {
        let mut config = OrbisConfig::default();
        config.database.min_connections = 10;
        config.database.max_connections = 2;
        assert!(matches!(
            config.connect().await,
            Err(OrbisError::Configuration(_))
        ));
    }

    #[test]
    fn test_options_builder() {
        let options = OrbisOptions::new()
            .create_literal("status", Value::from("active"))
            .operation(Operation::FindMany, false);
        assert!(options.entity.create.contains_key("status"));
        assert_eq!(options.entity.operations.get(Operation::FindMany), Some(false));
        assert_eq!(options.entity.operations.get(Operation::FindOne), None);
    }
}
