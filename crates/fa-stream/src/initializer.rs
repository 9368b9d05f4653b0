//! Collection Initializer
//!
//! Prepares the database on startup: enables pre-images on the watched
//! collections (update and delete handlers need the prior state) and
//! ensures indexes on `audit_logs` and the checkpoint collection.
//! Every step is best-effort; failures are collected as warnings.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use tracing::{info, warn};

/// Configuration for collection initialization
#[derive(Debug, Clone)]
pub struct InitConfig {
    pub watched_collections: Vec<String>,
    pub audit_collection: String,
    pub checkpoints_collection: String,
    /// Run `collMod` to turn on change stream pre-images
    pub enable_pre_images: bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            watched_collections: fa_common::WATCHED_COLLECTIONS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            audit_collection: fa_common::AUDIT_LOGS_COLLECTION.to_string(),
            checkpoints_collection: fa_common::CHECKPOINTS_COLLECTION.to_string(),
            enable_pre_images: true,
        }
    }
}

/// Result of initialization
#[derive(Debug, Default)]
pub struct InitResult {
    pub indexes_created: usize,
    /// Collections with pre-images enabled
    pub pre_images_enabled: Vec<String>,
    /// Any errors encountered (non-fatal)
    pub warnings: Vec<String>,
}

impl InitResult {
    pub fn is_success(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub struct CollectionInitializer {
    db: Database,
    config: InitConfig,
}

impl CollectionInitializer {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            config: InitConfig::default(),
        }
    }

    pub fn with_config(db: Database, config: InitConfig) -> Self {
        Self { db, config }
    }

    pub async fn init_all(&self) -> InitResult {
        let mut result = InitResult::default();

        if self.config.enable_pre_images {
            for collection in &self.config.watched_collections {
                self.enable_pre_images(collection, &mut result).await;
            }
        }

        self.create_indexes(&self.config.audit_collection, audit_log_indexes(), &mut result)
            .await;
        self.create_indexes(
            &self.config.checkpoints_collection,
            checkpoint_indexes(),
            &mut result,
        )
        .await;

        info!(
            indexes_created = result.indexes_created,
            pre_images = result.pre_images_enabled.len(),
            warnings = result.warnings.len(),
            "Collection initialization complete"
        );
        result
    }

    async fn enable_pre_images(&self, collection: &str, result: &mut InitResult) {
        let command = doc! {
            "collMod": collection,
            "changeStreamPreAndPostImages": { "enabled": true },
        };
        match self.db.run_command(command).await {
            Ok(_) => result.pre_images_enabled.push(collection.to_string()),
            Err(e) => {
                warn!("Failed to enable pre-images on {}: {}", collection, e);
                result.warnings.push(format!("{}: {}", collection, e));
            }
        }
    }

    async fn create_indexes(&self, name: &str, indexes: Vec<IndexModel>, result: &mut InitResult) {
        let collection = self.db.collection::<Document>(name);
        match collection.create_indexes(indexes).await {
            Ok(res) => {
                result.indexes_created += res.index_names.len();
                info!("Created {} indexes on {}", res.index_names.len(), name);
            }
            Err(e) => {
                warn!("Failed to create indexes on {}: {}", name, e);
                result.warnings.push(format!("{}: {}", name, e));
            }
        }
    }
}

fn index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

fn audit_log_indexes() -> Vec<IndexModel> {
    vec![
        // Backfill scans newest first
        index(doc! { "timestamp": -1 }, "idx_timestamp"),
        // History of one document
        index(doc! { "collection": 1, "docId": 1, "timestamp": -1 }, "idx_collection_doc"),
        index(doc! { "actorId": 1, "timestamp": -1 }, "idx_actor"),
    ]
}

fn checkpoint_indexes() -> Vec<IndexModel> {
    vec![index(doc! { "updatedAt": -1 }, "idx_updated")]
}
