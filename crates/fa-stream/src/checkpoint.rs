use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::{Client, Collection};
use parking_lot::RwLock;

/// Durable resume tokens, one per watched collection
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(&self, key: &str) -> Result<Option<Document>>;
    async fn save_checkpoint(&self, key: &str, token: Document) -> Result<()>;
    /// Clear a checkpoint (for recovery from stale resume token)
    async fn clear_checkpoint(&self, key: &str) -> Result<()>;
}

// ============================================================================
// MongoDB Checkpoint Store
// ============================================================================

pub struct MongoCheckpointStore {
    collection: Collection<Document>,
}

impl MongoCheckpointStore {
    pub fn new(client: &Client, db_name: &str, collection_name: &str) -> Self {
        Self {
            collection: client.database(db_name).collection(collection_name),
        }
    }
}

#[async_trait]
impl CheckpointStore for MongoCheckpointStore {
    async fn get_checkpoint(&self, key: &str) -> Result<Option<Document>> {
        let doc = self.collection.find_one(doc! { "_id": key }).await?;
        Ok(doc.and_then(|d| d.get_document("token").ok().cloned()))
    }

    async fn save_checkpoint(&self, key: &str, token: Document) -> Result<()> {
        self.collection
            .update_one(
                doc! { "_id": key },
                doc! { "$set": { "token": token, "updatedAt": bson::DateTime::now() } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn clear_checkpoint(&self, key: &str) -> Result<()> {
        self.collection.delete_one(doc! { "_id": key }).await?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Checkpoint Store (for testing/development)
// ============================================================================

#[derive(Default, Clone)]
pub struct MemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, Document>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_checkpoint(&self, key: &str) -> Result<Option<Document>> {
        Ok(self.checkpoints.read().get(key).cloned())
    }

    async fn save_checkpoint(&self, key: &str, token: Document) -> Result<()> {
        self.checkpoints.write().insert(key.to_string(), token);
        Ok(())
    }

    async fn clear_checkpoint(&self, key: &str) -> Result<()> {
        self.checkpoints.write().remove(key);
        Ok(())
    }
}
