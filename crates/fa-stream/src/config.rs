use serde::{Deserialize, Serialize};

/// Settings for one collection's change stream watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub source_database: String,
    pub source_collection: String,
    /// First reconnect delay after a stream or handler failure
    pub initial_backoff_ms: u64,
    /// Upper bound for the reconnect delay
    pub max_backoff_ms: u64,
}

impl WatcherConfig {
    pub fn for_collection(database: &str, collection: &str) -> Self {
        Self {
            source_database: database.to_string(),
            source_collection: collection.to_string(),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Resume token key in the checkpoint store
    pub fn checkpoint_key(&self) -> String {
        format!("checkpoint:{}", self.source_collection)
    }

    /// Next delay after a failure, doubling up to the cap
    pub fn next_backoff(&self, current_ms: u64) -> u64 {
        current_ms.saturating_mul(2).min(self.max_backoff_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            source_database: "fieldaudit".to_string(),
            source_collection: "tasks".to_string(),
            initial_backoff_ms: 5000,
            max_backoff_ms: 60000,
        }
    }
}
