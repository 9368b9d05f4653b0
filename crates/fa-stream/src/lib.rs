//! FieldAudit trigger runtime
//!
//! Watches MongoDB change streams on every watched collection and routes
//! each create/update/delete to the matching audit handler.

pub mod checkpoint;
pub mod config;
pub mod event;
pub mod initializer;
pub mod registry;
pub mod trigger;
pub mod watcher;

use anyhow::Result;
use async_trait::async_trait;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, MongoCheckpointStore};
pub use config::WatcherConfig;
pub use event::{ChangeEvent, ChangeKind};
pub use initializer::{CollectionInitializer, InitConfig, InitResult};
pub use registry::{CollectionHandlers, TriggerHandler, TriggerRegistry};
pub use trigger::{AuditTrigger, HandlerOutcome};
pub use watcher::{ChangeStreamWatcher, EventProcessor};

#[async_trait]
pub trait StreamWatcher: Send + Sync {
    /// Human-readable name used in logs
    fn name(&self) -> &str;

    async fn watch(&self) -> Result<()>;
}

/// Runs a set of watchers until all of them stop
#[derive(Default)]
pub struct StreamProcessor {
    watchers: Vec<Box<dyn StreamWatcher>>,
}

impl StreamProcessor {
    pub fn new() -> Self {
        Self { watchers: Vec::new() }
    }

    pub fn add_watcher(&mut self, watcher: Box<dyn StreamWatcher>) {
        self.watchers.push(watcher);
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    pub async fn start(self) {
        tracing::info!("Starting stream processor with {} watchers", self.watchers.len());
        let mut handles = Vec::new();
        for watcher in self.watchers {
            handles.push(tokio::spawn(async move {
                if let Err(e) = watcher.watch().await {
                    tracing::error!(watcher = watcher.name(), error = %e, "Stream watcher failed");
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}
