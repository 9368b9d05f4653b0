//! Audit Log Repository
//!
//! Append-only storage for audit entries plus the narrow patch path used by
//! the actor backfill.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Document};
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, Collection};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::entity::is_blank;
use crate::error::{AuditError, Result};
use crate::{ActorPatch, AuditLog, NewAuditLog};

#[async_trait]
pub trait AuditLogStore: Send + Sync {
    /// Insert one entry, stamping `timestamp` with the store's clock.
    async fn append(&self, entry: &NewAuditLog) -> Result<ObjectId>;

    /// Entries with `timestamp >= since`, newest first, at most `limit`.
    async fn find_since(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<AuditLog>>;

    /// Set `actorName`/`actorEmail` on entries that still lack both.
    ///
    /// The slice is committed as one batch. Returns the number of entries modified.
    async fn apply_actor_patches(&self, patches: &[ActorPatch]) -> Result<usize>;
}

/// Filter matching entries with neither attribution field set
fn unenriched_filter(id: ObjectId) -> Document {
    doc! {
        "_id": id,
        "actorName": { "$in": [null, ""] },
        "actorEmail": { "$in": [null, ""] },
    }
}

// ============================================================================
// MongoDB Audit Log Store
// ============================================================================

pub struct MongoAuditLogStore {
    client: Client,
    collection: Collection<Document>,
}

impl MongoAuditLogStore {
    pub fn new(client: Client, db_name: &str, collection_name: &str) -> Self {
        let collection = client.database(db_name).collection(collection_name);
        Self { client, collection }
    }
}

#[async_trait]
impl AuditLogStore for MongoAuditLogStore {
    async fn append(&self, entry: &NewAuditLog) -> Result<ObjectId> {
        let id = ObjectId::new();
        let fields = bson::to_document(entry)?;

        // Upsert on a fresh id is a plain insert, but lets the server stamp the time
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$setOnInsert": fields,
                    "$currentDate": { "timestamp": { "$type": "date" } },
                },
            )
            .upsert(true)
            .await?;

        Ok(id)
    }

    async fn find_since(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<AuditLog>> {
        let options = FindOptions::builder()
            .sort(doc! { "timestamp": -1 })
            .limit(limit)
            .build();

        let cursor = self
            .collection
            .find(doc! { "timestamp": { "$gte": bson::DateTime::from_chrono(since) } })
            .with_options(options)
            .await?;
        let raw: Vec<Document> = cursor.try_collect().await?;

        let mut logs = Vec::with_capacity(raw.len());
        for doc in raw {
            let id = doc.get_object_id("_id").ok();
            match bson::from_document::<AuditLog>(doc) {
                Ok(log) => logs.push(log),
                Err(e) => warn!(id = ?id, error = %e, "Skipping malformed audit log entry"),
            }
        }
        Ok(logs)
    }

    async fn apply_actor_patches(&self, patches: &[ActorPatch]) -> Result<usize> {
        if patches.is_empty() {
            return Ok(0);
        }

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let mut modified = 0usize;
        for patch in patches {
            let result = self
                .collection
                .update_one(
                    unenriched_filter(patch.id),
                    doc! {
                        "$set": {
                            "actorName": patch.actor_name.clone(),
                            "actorEmail": patch.actor_email.clone(),
                        }
                    },
                )
                .session(&mut session)
                .await;

            match result {
                Ok(r) => modified += r.modified_count as usize,
                Err(e) => return Err(abort_batch(session.abort_transaction(), e.into()).await),
            }
        }

        session.commit_transaction().await?;
        debug!(patches = patches.len(), modified, "Committed actor patch batch");
        Ok(modified)
    }
}

/// Roll back a failed patch batch; the write error is what callers see.
async fn abort_batch<E: std::fmt::Display>(
    abort: impl std::future::IntoFuture<Output = std::result::Result<(), E>>,
    cause: AuditError,
) -> AuditError {
    if let Err(abort_err) = abort.await {
        warn!(error = %abort_err, cause = %cause, "Failed to abort actor patch transaction");
    }
    cause
}

// ============================================================================
// In-Memory Audit Log Store (for testing/development)
// ============================================================================

#[derive(Default)]
pub struct InMemoryAuditLogStore {
    entries: RwLock<Vec<AuditLog>>,
    last_timestamp: RwLock<Option<DateTime<Utc>>>,
    fail_appends: AtomicBool,
    fail_patches: AtomicBool,
    patch_batches: AtomicUsize,
    patch_writes: AtomicUsize,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-existing entry, bypassing the append path.
    pub fn insert_existing(&self, log: AuditLog) {
        self.entries.write().push(log);
    }

    /// All entries in insertion order
    pub fn entries(&self) -> Vec<AuditLog> {
        self.entries.read().clone()
    }

    pub fn get(&self, id: &ObjectId) -> Option<AuditLog> {
        self.entries.read().iter().find(|e| &e.id == id).cloned()
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_patches(&self, fail: bool) {
        self.fail_patches.store(fail, Ordering::SeqCst);
    }

    /// Number of patch batches committed
    pub fn patch_batches(&self) -> usize {
        self.patch_batches.load(Ordering::SeqCst)
    }

    /// Number of entries modified by patches
    pub fn patch_writes(&self) -> usize {
        self.patch_writes.load(Ordering::SeqCst)
    }

    /// Store clock, strictly increasing across appends
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.last_timestamp.write();
        let now = Utc::now();
        let ts = match *last {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };
        *last = Some(ts);
        ts
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append(&self, entry: &NewAuditLog) -> Result<ObjectId> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(AuditError::unavailable("audit log store is unavailable"));
        }
        let id = ObjectId::new();
        let log = AuditLog::from_new(id, entry.clone(), self.next_timestamp());
        self.entries.write().push(log);
        Ok(id)
    }

    async fn find_since(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<AuditLog>> {
        let mut logs: Vec<AuditLog> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }

    async fn apply_actor_patches(&self, patches: &[ActorPatch]) -> Result<usize> {
        if self.fail_patches.load(Ordering::SeqCst) {
            return Err(AuditError::unavailable("audit log store rejected the batch"));
        }
        if patches.is_empty() {
            return Ok(0);
        }

        let mut entries = self.entries.write();
        let mut modified = 0usize;
        for patch in patches {
            let target = entries.iter_mut().find(|e| {
                e.id == patch.id
                    && is_blank(e.actor_name.as_deref())
                    && is_blank(e.actor_email.as_deref())
            });
            if let Some(entry) = target {
                entry.actor_name = patch.actor_name.clone();
                entry.actor_email = patch.actor_email.clone();
                modified += 1;
            }
        }

        self.patch_batches.fetch_add(1, Ordering::SeqCst);
        self.patch_writes.fetch_add(modified, Ordering::SeqCst);
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActorInfo;

    #[tokio::test]
    async fn test_abort_failure_keeps_write_error() {
        let err = abort_batch(
            async { Err::<(), _>("session expired") },
            AuditError::unavailable("write conflict"),
        )
        .await;
        assert_eq!(err.to_string(), "Store unavailable: write conflict");

        let err = abort_batch(
            async { Ok::<(), &str>(()) },
            AuditError::unavailable("write conflict"),
        )
        .await;
        assert!(matches!(err, AuditError::Unavailable { .. }));
    }

    fn new_entry(doc_id: &str, actor_id: Option<&str>) -> NewAuditLog {
        NewAuditLog::created(
            "tasks",
            doc_id,
            actor_id.map(String::from),
            ActorInfo::unresolved(),
            doc! { "remark": "a" },
        )
    }

    #[tokio::test]
    async fn test_append_stamps_increasing_timestamps() {
        let store = InMemoryAuditLogStore::new();
        for i in 0..5 {
            store.append(&new_entry(&format!("t{}", i), None)).await.unwrap();
        }

        let entries = store.entries();
        assert_eq!(entries.len(), 5);
        assert!(entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_append_failure_propagates() {
        let store = InMemoryAuditLogStore::new();
        store.set_fail_appends(true);

        assert!(store.append(&new_entry("t1", None)).await.is_err());
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn test_find_since_is_newest_first_and_capped() {
        let store = InMemoryAuditLogStore::new();
        for i in 0..4 {
            store.append(&new_entry(&format!("t{}", i), None)).await.unwrap();
        }

        let found = store.find_since(Utc::now() - Duration::days(1), 3).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn test_find_since_excludes_older_entries() {
        let store = InMemoryAuditLogStore::new();
        let old = AuditLog::from_new(
            ObjectId::new(),
            new_entry("old", Some("u1")),
            Utc::now() - Duration::days(400),
        );
        store.insert_existing(old);
        store.append(&new_entry("recent", Some("u1"))).await.unwrap();

        let found = store.find_since(Utc::now() - Duration::days(180), 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].doc_id, "recent");
    }

    #[tokio::test]
    async fn test_patch_only_touches_unenriched_entries() {
        let store = InMemoryAuditLogStore::new();
        let id = store.append(&new_entry("t1", Some("u1"))).await.unwrap();
        let before = store.get(&id).unwrap();

        let patch = ActorPatch {
            id,
            actor_name: Some("John Doe".to_string()),
            actor_email: Some("j@x.com".to_string()),
        };
        assert_eq!(store.apply_actor_patches(&[patch.clone()]).await.unwrap(), 1);

        let after = store.get(&id).unwrap();
        assert_eq!(after.actor_name.as_deref(), Some("John Doe"));
        assert_eq!(after.actor_email.as_deref(), Some("j@x.com"));
        assert_eq!(after.timestamp, before.timestamp);
        assert_eq!(after.after, before.after);
        assert_eq!(after.action, before.action);

        // Second application is a no-op
        assert_eq!(store.apply_actor_patches(&[patch]).await.unwrap(), 0);
        assert_eq!(store.patch_writes(), 1);
    }
}
