//! FieldAudit Configuration System
//!
//! TOML-based configuration with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mongodb: MongoConfig,
    pub triggers: TriggerConfig,
    pub backfill: BackfillConfig,
}

/// Health/metrics HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// MongoDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017/?replicaSet=rs0&directConnection=true".to_string(),
            database: "fieldaudit".to_string(),
        }
    }
}

/// Live trigger pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Destination collection for audit entries
    pub audit_collection: String,
    /// User profile collection used for actor resolution
    pub users_collection: String,
    /// Resume token collection (mongodb checkpoint store only)
    pub checkpoint_collection: String,
    /// Checkpoint store type: mongodb, memory
    pub checkpoint_store: String,
    /// Enable changeStreamPreAndPostImages on watched collections at startup
    pub ensure_pre_images: bool,
    /// First reconnect delay after a stream or handler failure
    pub initial_backoff_ms: u64,
    /// Upper bound for the reconnect delay
    pub max_backoff_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            audit_collection: fa_common::AUDIT_LOGS_COLLECTION.to_string(),
            users_collection: fa_common::USERS_COLLECTION.to_string(),
            checkpoint_collection: fa_common::CHECKPOINTS_COLLECTION.to_string(),
            checkpoint_store: "mongodb".to_string(),
            ensure_pre_images: true,
            initial_backoff_ms: 5000,
            max_backoff_ms: 60000,
        }
    }
}

/// Defaults for the actor backfill job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    /// Lookback window in days
    pub since_days: i64,
    /// Maximum number of audit entries scanned per run
    pub limit: i64,
    /// Patches per committed batch
    pub batch_size: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            since_days: 180,
            limit: 2000,
            batch_size: 400,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mongodb.uri.trim().is_empty() {
            return Err(ConfigError::ValidationError("mongodb.uri must not be empty".to_string()));
        }
        if self.mongodb.database.trim().is_empty() {
            return Err(ConfigError::ValidationError("mongodb.database must not be empty".to_string()));
        }
        match self.triggers.checkpoint_store.as_str() {
            "mongodb" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "triggers.checkpoint_store must be mongodb or memory, got {}",
                    other
                )));
            }
        }
        if self.triggers.initial_backoff_ms == 0
            || self.triggers.max_backoff_ms < self.triggers.initial_backoff_ms
        {
            return Err(ConfigError::ValidationError(
                "triggers backoff must satisfy 0 < initial_backoff_ms <= max_backoff_ms".to_string(),
            ));
        }
        if self.backfill.since_days <= 0 || self.backfill.limit <= 0 {
            return Err(ConfigError::ValidationError(
                "backfill.since_days and backfill.limit must be positive".to_string(),
            ));
        }
        if self.backfill.batch_size == 0 {
            return Err(ConfigError::ValidationError("backfill.batch_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# FieldAudit Configuration
# Environment variables (FIELDAUDIT_*) override these settings

[http]
port = 9090
host = "0.0.0.0"

[mongodb]
uri = "mongodb://localhost:27017/?replicaSet=rs0&directConnection=true"
database = "fieldaudit"

[triggers]
audit_collection = "audit_logs"
users_collection = "users"
checkpoint_collection = "audit_stream_checkpoints"
checkpoint_store = "mongodb"  # mongodb, memory
ensure_pre_images = true
initial_backoff_ms = 5000
max_backoff_ms = 60000

[backfill]
since_days = 180
limit = 2000
batch_size = 400
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.http.port, 9090);
        assert_eq!(config.triggers.audit_collection, "audit_logs");
        assert_eq!(config.triggers.users_collection, "users");
        assert_eq!(config.backfill.since_days, 180);
        assert_eq!(config.backfill.limit, 2000);
        assert_eq!(config.backfill.batch_size, 400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.mongodb.database, "fieldaudit");
        assert_eq!(config.triggers.checkpoint_store, "mongodb");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [backfill]
            since_days = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.backfill.since_days, 30);
        assert_eq!(config.backfill.limit, 2000);
        assert_eq!(config.triggers.max_backoff_ms, 60000);
    }

    #[test]
    fn test_validate_rejects_unknown_checkpoint_store() {
        let mut config = AppConfig::default();
        config.triggers.checkpoint_store = "redis".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_backoff() {
        let mut config = AppConfig::default();
        config.triggers.max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldaudit.toml");
        std::fs::write(&path, "[mongodb]\ndatabase = \"field_ops\"\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.mongodb.database, "field_ops");
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[mongodb\n").unwrap();

        assert!(matches!(AppConfig::from_file(&path), Err(ConfigError::ParseError(_))));
    }
}
