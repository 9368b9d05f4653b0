//! Change Stream Watcher
//!
//! One watcher per collection. Events are handled strictly in stream order;
//! the resume token is checkpointed only after the handler succeeds, so a
//! failed event is redelivered after reconnecting.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bson::Document;
use futures::stream::StreamExt;
use mongodb::change_stream::event::{ChangeStreamEvent, ResumeToken};
use mongodb::change_stream::ChangeStream;
use mongodb::options::{ChangeStreamOptions, FullDocumentBeforeChangeType, FullDocumentType};
use mongodb::{Client, Collection};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::WatcherConfig;
use crate::event::ChangeEvent;
use crate::registry::TriggerRegistry;
use crate::trigger::HandlerOutcome;
use crate::StreamWatcher;

/// Applies events to the registry and advances the checkpoint
pub struct EventProcessor {
    collection: String,
    checkpoint_key: String,
    checkpoint_store: Arc<dyn CheckpointStore>,
    registry: Arc<TriggerRegistry>,
}

impl EventProcessor {
    pub fn new(
        config: &WatcherConfig,
        checkpoint_store: Arc<dyn CheckpointStore>,
        registry: Arc<TriggerRegistry>,
    ) -> Self {
        Self {
            collection: config.source_collection.clone(),
            checkpoint_key: config.checkpoint_key(),
            checkpoint_store,
            registry,
        }
    }

    /// Dispatch one event, then persist `token` as the resume point.
    ///
    /// A handler error leaves the checkpoint where it was.
    pub async fn process(
        &self,
        event: Option<ChangeEvent>,
        token: Option<Document>,
    ) -> Result<Option<HandlerOutcome>> {
        let outcome = match event {
            Some(event) => Some(self.registry.dispatch(event).await?),
            None => {
                debug!(collection = %self.collection, "Ignoring non-audited change event");
                None
            }
        };

        if let Some(token) = token {
            self.checkpoint_store
                .save_checkpoint(&self.checkpoint_key, token)
                .await?;
        }
        Ok(outcome)
    }
}

pub struct ChangeStreamWatcher {
    client: Client,
    config: WatcherConfig,
    checkpoint_store: Arc<dyn CheckpointStore>,
    processor: EventProcessor,
}

impl ChangeStreamWatcher {
    pub fn new(
        client: Client,
        config: WatcherConfig,
        checkpoint_store: Arc<dyn CheckpointStore>,
        registry: Arc<TriggerRegistry>,
    ) -> Self {
        let processor = EventProcessor::new(&config, checkpoint_store.clone(), registry);
        Self {
            client,
            config,
            checkpoint_store,
            processor,
        }
    }

    fn stream_options(&self, resume_token: Option<Document>) -> ChangeStreamOptions {
        let mut options = change_stream_options();

        if let Some(doc) = resume_token {
            match bson::from_document::<ResumeToken>(doc) {
                Ok(token) => {
                    info!(collection = %self.config.source_collection, "Resuming from checkpoint");
                    options.resume_after = Some(token);
                }
                Err(e) => {
                    warn!(collection = %self.config.source_collection, error = %e, "Unreadable checkpoint, starting from current position");
                }
            }
        } else {
            info!(collection = %self.config.source_collection, "Starting from current position (no checkpoint)");
        }
        options
    }

    async fn process_stream_events(
        &self,
        stream: &mut ChangeStream<ChangeStreamEvent<Document>>,
    ) -> Result<()> {
        while let Some(next) = stream.next().await {
            let event = next?;
            let change = ChangeEvent::from_stream_event(&self.config.source_collection, event);
            let token = stream
                .resume_token()
                .map(|t| bson::to_document(&t))
                .transpose()?;

            if let Some(outcome) = self.processor.process(change, token).await? {
                debug!(collection = %self.config.source_collection, outcome = ?outcome, "Change event handled");
            }
        }
        Err(anyhow::anyhow!("Change stream closed unexpectedly"))
    }
}

#[async_trait]
impl StreamWatcher for ChangeStreamWatcher {
    fn name(&self) -> &str {
        &self.config.source_collection
    }

    async fn watch(&self) -> Result<()> {
        let collection: Collection<Document> = self
            .client
            .database(&self.config.source_database)
            .collection(&self.config.source_collection);
        let checkpoint_key = self.config.checkpoint_key();
        let name = self.config.source_collection.as_str();

        let mut consecutive_failures = 0u32;
        let mut backoff_ms = self.config.initial_backoff_ms;

        loop {
            let resume_token = match self.checkpoint_store.get_checkpoint(&checkpoint_key).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(collection = name, error = %e, "Failed to load checkpoint, starting from current position");
                    None
                }
            };

            let options = self.stream_options(resume_token);
            let mut stream = match collection.watch().with_options(options).await {
                Ok(s) => {
                    consecutive_failures = 0;
                    backoff_ms = self.config.initial_backoff_ms;
                    info!(
                        "[{}] Change stream opened on {}.{}",
                        name, self.config.source_database, self.config.source_collection
                    );
                    s
                }
                Err(e) => {
                    consecutive_failures += 1;

                    if is_stale_resume_token_error(&e) {
                        error!("[{}] Resume token expired - clearing checkpoint. EVENTS MAY BE MISSED.", name);
                        let _ = self.checkpoint_store.clear_checkpoint(&checkpoint_key).await;
                        backoff_ms = self.config.initial_backoff_ms;
                        continue;
                    }

                    error!(
                        "[{}] Failed to open change stream (attempt {}), retrying in {}ms: {}",
                        name, consecutive_failures, backoff_ms, e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = self.config.next_backoff(backoff_ms);
                    continue;
                }
            };

            // Only returns on error; handler failures land here too
            if let Err(e) = self.process_stream_events(&mut stream).await {
                consecutive_failures += 1;

                if is_stale_resume_token_error(&e) {
                    error!("[{}] Resume token expired - clearing checkpoint. EVENTS MAY BE MISSED.", name);
                    let _ = self.checkpoint_store.clear_checkpoint(&checkpoint_key).await;
                    backoff_ms = self.config.initial_backoff_ms;
                    continue;
                }

                warn!(
                    "[{}] Change stream error (attempt {}), reconnecting in {}ms: {}",
                    name, consecutive_failures, backoff_ms, e
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = self.config.next_backoff(backoff_ms);
            }
        }
    }
}

/// Both images come from the stored pre/post images of the change itself,
/// never from a lookup of the document's current state.
fn change_stream_options() -> ChangeStreamOptions {
    ChangeStreamOptions::builder()
        .full_document(Some(FullDocumentType::WhenAvailable))
        .full_document_before_change(Some(FullDocumentBeforeChangeType::WhenAvailable))
        .build()
}

/// Check if an error is due to a stale/expired resume token
fn is_stale_resume_token_error<E: std::fmt::Display>(e: &E) -> bool {
    let err_str = e.to_string().to_lowercase();
    (err_str.contains("changestream") && err_str.contains("history"))
        || err_str.contains("resume token")
        || err_str.contains("oplog")
        || err_str.contains("invalidate")
}
