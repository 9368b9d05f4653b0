//! Change events
//!
//! Store-neutral form of a create/update/delete notification on a watched
//! collection, plus the conversion from MongoDB change stream events.

use bson::{Bson, Document};
use mongodb::change_stream::event::{ChangeStreamEvent, OperationType};

/// Lifecycle stage of a watched document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Map a change stream operation; other operations are not audited.
    pub fn from_operation(op: &OperationType) -> Option<Self> {
        match op {
            OperationType::Insert => Some(Self::Create),
            OperationType::Update | OperationType::Replace => Some(Self::Update),
            OperationType::Delete => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed write on a watched collection
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: String,
    pub doc_id: String,
    pub kind: ChangeKind,
    /// State immediately before the write (update, delete)
    pub before: Option<Document>,
    /// State after the write (create, update)
    pub after: Option<Document>,
}

impl ChangeEvent {
    pub fn created(collection: &str, doc_id: &str, after: Document) -> Self {
        Self {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            kind: ChangeKind::Create,
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(collection: &str, doc_id: &str, before: Document, after: Document) -> Self {
        Self {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            kind: ChangeKind::Update,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(collection: &str, doc_id: &str, before: Document) -> Self {
        Self {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            kind: ChangeKind::Delete,
            before: Some(before),
            after: None,
        }
    }

    /// An event of the given kind that carries no document images
    pub fn empty(collection: &str, doc_id: &str, kind: ChangeKind) -> Self {
        Self {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            kind,
            before: None,
            after: None,
        }
    }

    /// Convert a change stream event from `collection`.
    ///
    /// Returns `None` for operations that are not audited or when no
    /// document id can be determined.
    pub fn from_stream_event(collection: &str, event: ChangeStreamEvent<Document>) -> Option<Self> {
        let kind = ChangeKind::from_operation(&event.operation_type)?;

        let before = event.full_document_before_change;
        let after = match kind {
            ChangeKind::Delete => None,
            _ => event.full_document,
        };

        let doc_id = event
            .document_key
            .as_ref()
            .and_then(|key| key.get("_id"))
            .or_else(|| after.as_ref().and_then(|d| d.get("_id")))
            .or_else(|| before.as_ref().and_then(|d| d.get("_id")))
            .map(document_id_string)?;

        Some(Self {
            collection: collection.to_string(),
            doc_id,
            kind,
            before: if kind == ChangeKind::Create { None } else { before },
            after,
        })
    }
}

/// Render a document `_id` as the string stored in `docId`
pub fn document_id_string(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;

    #[test]
    fn test_operation_mapping() {
        assert_eq!(ChangeKind::from_operation(&OperationType::Insert), Some(ChangeKind::Create));
        assert_eq!(ChangeKind::from_operation(&OperationType::Update), Some(ChangeKind::Update));
        assert_eq!(ChangeKind::from_operation(&OperationType::Replace), Some(ChangeKind::Update));
        assert_eq!(ChangeKind::from_operation(&OperationType::Delete), Some(ChangeKind::Delete));
        assert_eq!(ChangeKind::from_operation(&OperationType::Drop), None);
        assert_eq!(ChangeKind::from_operation(&OperationType::Invalidate), None);
    }

    #[test]
    fn test_document_id_string() {
        let oid = ObjectId::new();
        assert_eq!(document_id_string(&Bson::ObjectId(oid)), oid.to_hex());
        assert_eq!(document_id_string(&Bson::String("t1".to_string())), "t1");
        assert_eq!(document_id_string(&Bson::Int32(7)), "7");
    }

    #[test]
    fn test_constructors_match_kind_shape() {
        let created = ChangeEvent::created("tasks", "t1", doc! { "a": 1 });
        assert!(created.before.is_none() && created.after.is_some());

        let updated = ChangeEvent::updated("tasks", "t1", doc! { "a": 1 }, doc! { "a": 2 });
        assert!(updated.before.is_some() && updated.after.is_some());

        let deleted = ChangeEvent::deleted("tasks", "t1", doc! { "a": 2 });
        assert!(deleted.before.is_some() && deleted.after.is_none());

        let empty = ChangeEvent::empty("tasks", "t1", ChangeKind::Update);
        assert!(empty.before.is_none() && empty.after.is_none());
    }
}
