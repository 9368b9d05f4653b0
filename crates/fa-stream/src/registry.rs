//! Trigger Registry
//!
//! Three handlers (create, update, delete) per watched collection, all
//! backed by the same [`AuditTrigger`]. Dispatch is keyed by the event's
//! collection and kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::event::{ChangeEvent, ChangeKind};
use crate::trigger::{record_skipped, AuditTrigger, HandlerOutcome};

/// One named handler bound to a collection and lifecycle stage
pub struct TriggerHandler {
    name: String,
    collection: String,
    kind: ChangeKind,
    trigger: Arc<AuditTrigger>,
}

impl TriggerHandler {
    pub fn new(collection: &str, kind: ChangeKind, trigger: Arc<AuditTrigger>) -> Self {
        Self {
            name: format!("audit_{}_on_{}", collection, kind),
            collection: collection.to_string(),
            kind,
            trigger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub async fn handle(&self, event: ChangeEvent) -> fa_audit::Result<HandlerOutcome> {
        let ChangeEvent { doc_id, before, after, .. } = event;
        match self.kind {
            ChangeKind::Create => self.trigger.on_create(&self.collection, &doc_id, after).await,
            ChangeKind::Update => {
                self.trigger
                    .on_update(&self.collection, &doc_id, before, after)
                    .await
            }
            ChangeKind::Delete => self.trigger.on_delete(&self.collection, &doc_id, before).await,
        }
    }
}

/// The create/update/delete handlers of one collection
pub struct CollectionHandlers {
    pub on_create: TriggerHandler,
    pub on_update: TriggerHandler,
    pub on_delete: TriggerHandler,
}

impl CollectionHandlers {
    fn new(collection: &str, trigger: &Arc<AuditTrigger>) -> Self {
        Self {
            on_create: TriggerHandler::new(collection, ChangeKind::Create, trigger.clone()),
            on_update: TriggerHandler::new(collection, ChangeKind::Update, trigger.clone()),
            on_delete: TriggerHandler::new(collection, ChangeKind::Delete, trigger.clone()),
        }
    }

    pub fn for_kind(&self, kind: ChangeKind) -> &TriggerHandler {
        match kind {
            ChangeKind::Create => &self.on_create,
            ChangeKind::Update => &self.on_update,
            ChangeKind::Delete => &self.on_delete,
        }
    }
}

pub struct TriggerRegistry {
    collections: BTreeMap<String, CollectionHandlers>,
}

impl TriggerRegistry {
    pub fn new(collections: &[&str], trigger: Arc<AuditTrigger>) -> Self {
        let collections = collections
            .iter()
            .map(|name| (name.to_string(), CollectionHandlers::new(name, &trigger)))
            .collect();
        Self { collections }
    }

    /// Registry covering every collection in [`fa_common::WATCHED_COLLECTIONS`]
    pub fn for_watched_collections(trigger: Arc<AuditTrigger>) -> Self {
        Self::new(fa_common::WATCHED_COLLECTIONS, trigger)
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn handler(&self, collection: &str, kind: ChangeKind) -> Option<&TriggerHandler> {
        self.collections.get(collection).map(|h| h.for_kind(kind))
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.collections
            .values()
            .flat_map(|h| [&h.on_create, &h.on_update, &h.on_delete])
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Route an event to its handler.
    ///
    /// Events for unregistered collections are ignored.
    pub async fn dispatch(&self, event: ChangeEvent) -> fa_audit::Result<HandlerOutcome> {
        match self.handler(&event.collection, event.kind) {
            Some(handler) => handler.handle(event).await,
            None => {
                debug!(collection = %event.collection, kind = %event.kind, "No handler for event");
                record_skipped(&event.collection, "unrouted");
                Ok(HandlerOutcome::Unrouted)
            }
        }
    }
}
