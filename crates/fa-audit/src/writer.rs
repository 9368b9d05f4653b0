//! Audit Log Writer
//!
//! Appends exactly one entry per call. Append failures are returned to the
//! caller: a missing audit entry is a correctness gap, so the triggering
//! event must be retried rather than acknowledged.

use std::sync::Arc;

use bson::oid::ObjectId;
use tracing::{debug, error};

use crate::error::Result;
use crate::{AuditLogStore, NewAuditLog};

#[derive(Clone)]
pub struct AuditLogWriter {
    store: Arc<dyn AuditLogStore>,
}

impl AuditLogWriter {
    pub fn new(store: Arc<dyn AuditLogStore>) -> Self {
        Self { store }
    }

    pub async fn write(&self, entry: NewAuditLog) -> Result<ObjectId> {
        match self.store.append(&entry).await {
            Ok(id) => {
                crate::metrics::record_entry_written(&entry.collection, entry.action);
                debug!(
                    id = %id,
                    action = %entry.action,
                    collection = %entry.collection,
                    doc_id = %entry.doc_id,
                    "Audit entry written"
                );
                Ok(id)
            }
            Err(e) => {
                crate::metrics::record_write_failure(&entry.collection);
                error!(
                    action = %entry.action,
                    collection = %entry.collection,
                    doc_id = %entry.doc_id,
                    error = %e,
                    "Failed to write audit entry"
                );
                Err(e)
            }
        }
    }
}
