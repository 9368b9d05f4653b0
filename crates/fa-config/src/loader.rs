//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "fieldaudit.toml",
    "./config/config.toml",
    "/etc/fieldaudit/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path.
    ///
    /// Unlike the search paths, an explicit path must exist.
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match self.find_config_file()? {
            Some(path) => {
                info!(?path, "Loading configuration from file");
                AppConfig::from_file(&path)?
            }
            None => AppConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ValidationError(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        if let Ok(path) = env::var("FIELDAUDIT_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists()))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `FIELDAUDIT_*` overrides using the given variable lookup.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(port) = var("FIELDAUDIT_HTTP_PORT").and_then(|v| v.parse().ok()) {
        config.http.port = port;
    }
    if let Some(val) = var("FIELDAUDIT_HTTP_HOST") {
        config.http.host = val;
    }

    // MongoDB
    if let Some(val) = var("FIELDAUDIT_MONGODB_URI") {
        config.mongodb.uri = val;
    }
    if let Some(val) = var("FIELDAUDIT_MONGODB_DATABASE") {
        config.mongodb.database = val;
    }

    // Triggers
    if let Some(val) = var("FIELDAUDIT_AUDIT_COLLECTION") {
        config.triggers.audit_collection = val;
    }
    if let Some(val) = var("FIELDAUDIT_USERS_COLLECTION") {
        config.triggers.users_collection = val;
    }
    if let Some(val) = var("FIELDAUDIT_CHECKPOINT_STORE") {
        config.triggers.checkpoint_store = val;
    }
    if let Some(val) = var("FIELDAUDIT_ENSURE_PRE_IMAGES") {
        config.triggers.ensure_pre_images = val.parse().unwrap_or(true);
    }
    if let Some(ms) = var("FIELDAUDIT_INITIAL_BACKOFF_MS").and_then(|v| v.parse().ok()) {
        config.triggers.initial_backoff_ms = ms;
    }
    if let Some(ms) = var("FIELDAUDIT_MAX_BACKOFF_MS").and_then(|v| v.parse().ok()) {
        config.triggers.max_backoff_ms = ms;
    }

    // Backfill
    if let Some(days) = var("FIELDAUDIT_BACKFILL_SINCE_DAYS").and_then(|v| v.parse().ok()) {
        config.backfill.since_days = days;
    }
    if let Some(limit) = var("FIELDAUDIT_BACKFILL_LIMIT").and_then(|v| v.parse().ok()) {
        config.backfill.limit = limit;
    }
    if let Some(size) = var("FIELDAUDIT_BACKFILL_BATCH_SIZE").and_then(|v| v.parse().ok()) {
        config.backfill.batch_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_env_overrides() {
        let env = vars(&[
            ("FIELDAUDIT_MONGODB_URI", "mongodb://db:27017"),
            ("FIELDAUDIT_MONGODB_DATABASE", "field_ops"),
            ("FIELDAUDIT_HTTP_PORT", "9191"),
            ("FIELDAUDIT_CHECKPOINT_STORE", "memory"),
            ("FIELDAUDIT_BACKFILL_BATCH_SIZE", "250"),
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, |k| env.get(k).cloned());

        assert_eq!(config.mongodb.uri, "mongodb://db:27017");
        assert_eq!(config.mongodb.database, "field_ops");
        assert_eq!(config.http.port, 9191);
        assert_eq!(config.triggers.checkpoint_store, "memory");
        assert_eq!(config.backfill.batch_size, 250);
    }

    #[test]
    fn test_unparseable_numbers_are_ignored() {
        let env = vars(&[("FIELDAUDIT_HTTP_PORT", "not-a-port")]);
        let mut config = AppConfig::default();
        apply_overrides(&mut config, |k| env.get(k).cloned());

        assert_eq!(config.http.port, 9090);
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let loader = ConfigLoader::with_path("/definitely/not/here.toml");
        assert!(matches!(loader.load(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[triggers]\ncheckpoint_store = \"memory\"\n").unwrap();

        let config = ConfigLoader::with_path(&path).load().unwrap();
        assert_eq!(config.triggers.checkpoint_store, "memory");
    }
}
