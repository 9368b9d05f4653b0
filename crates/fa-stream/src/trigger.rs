//! Audit trigger handlers
//!
//! Stateless: each call turns one change event into at most one audit
//! entry. Actor lookups never fail the handler; audit writes do.

use bson::oid::ObjectId;
use bson::Document;
use metrics::counter;
use tracing::{debug, warn};

use fa_audit::{
    changed_fields, extract_actor_id, ActorResolver, AuditLogWriter, NewAuditLog, Result,
};

/// What a handler did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Entry appended to the audit log
    Written(ObjectId),
    /// Event carried no usable document image; nothing logged
    Empty,
    /// No handler registered for the event's collection
    Unrouted,
}

pub(crate) fn record_skipped(collection: &str, reason: &'static str) {
    counter!(
        "fa_trigger_events_skipped_total",
        "collection" => collection.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub struct AuditTrigger {
    resolver: ActorResolver,
    writer: AuditLogWriter,
}

impl AuditTrigger {
    pub fn new(resolver: ActorResolver, writer: AuditLogWriter) -> Self {
        Self { resolver, writer }
    }

    /// Log a newly created document.
    pub async fn on_create(
        &self,
        collection: &str,
        doc_id: &str,
        after: Option<Document>,
    ) -> Result<HandlerOutcome> {
        let Some(after) = after else {
            debug!(collection, doc_id, "Create event without document, skipping");
            record_skipped(collection, "empty");
            return Ok(HandlerOutcome::Empty);
        };

        let actor_id = extract_actor_id(&after);
        let actor = self.resolver.resolve(actor_id.as_deref()).await;

        let id = self
            .writer
            .write(NewAuditLog::created(collection, doc_id, actor_id, actor, after))
            .await?;
        Ok(HandlerOutcome::Written(id))
    }

    /// Log an update; the actor is taken from the new state.
    pub async fn on_update(
        &self,
        collection: &str,
        doc_id: &str,
        before: Option<Document>,
        after: Option<Document>,
    ) -> Result<HandlerOutcome> {
        let (before, after) = match (before, after) {
            (Some(before), Some(after)) => (before, after),
            (None, None) => {
                debug!(collection, doc_id, "Update event without documents, skipping");
                record_skipped(collection, "empty");
                return Ok(HandlerOutcome::Empty);
            }
            (before, _) => {
                let missing = if before.is_none() { "before" } else { "after" };
                warn!(collection, doc_id, missing, "Update event is missing a document image, skipping");
                record_skipped(collection, "partial");
                return Ok(HandlerOutcome::Empty);
            }
        };

        let changed = changed_fields(&before, &after);
        let actor_id = extract_actor_id(&after);
        let actor = self.resolver.resolve(actor_id.as_deref()).await;

        let id = self
            .writer
            .write(NewAuditLog::updated(
                collection, doc_id, actor_id, actor, before, after, changed,
            ))
            .await?;
        Ok(HandlerOutcome::Written(id))
    }

    /// Log a deletion; the actor is taken from the last known state.
    pub async fn on_delete(
        &self,
        collection: &str,
        doc_id: &str,
        before: Option<Document>,
    ) -> Result<HandlerOutcome> {
        let Some(before) = before else {
            debug!(collection, doc_id, "Delete event without pre-image, skipping");
            record_skipped(collection, "empty");
            return Ok(HandlerOutcome::Empty);
        };

        let actor_id = extract_actor_id(&before);
        let actor = self.resolver.resolve(actor_id.as_deref()).await;

        let id = self
            .writer
            .write(NewAuditLog::deleted(collection, doc_id, actor_id, actor, before))
            .await?;
        Ok(HandlerOutcome::Written(id))
    }
}
