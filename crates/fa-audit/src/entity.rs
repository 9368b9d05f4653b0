//! Audit Log Entity
//!
//! One entry per observed create/update/delete on a watched collection.
//! Entries are immutable once written, apart from the actor backfill which
//! may fill in `actorName`/`actorEmail` when both are absent.

use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use bson::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ActorInfo;

/// Kind of change that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry as assembled by a trigger handler.
///
/// Carries no timestamp: the store stamps the entry with its own clock
/// when it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditLog {
    pub action: AuditAction,
    pub collection: String,
    pub doc_id: String,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Vec<String>>,
}

impl NewAuditLog {
    /// Entry for a newly created document: `after` only.
    pub fn created(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        actor_id: Option<String>,
        actor: ActorInfo,
        after: Document,
    ) -> Self {
        Self {
            action: AuditAction::Create,
            collection: collection.into(),
            doc_id: doc_id.into(),
            actor_id,
            actor_name: actor.actor_name,
            actor_email: actor.actor_email,
            before: None,
            after: Some(after),
            changed_fields: None,
        }
    }

    /// Entry for an updated document: both images plus the changed fields.
    pub fn updated(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        actor_id: Option<String>,
        actor: ActorInfo,
        before: Document,
        after: Document,
        changed_fields: Vec<String>,
    ) -> Self {
        Self {
            action: AuditAction::Update,
            collection: collection.into(),
            doc_id: doc_id.into(),
            actor_id,
            actor_name: actor.actor_name,
            actor_email: actor.actor_email,
            before: Some(before),
            after: Some(after),
            changed_fields: Some(changed_fields),
        }
    }

    /// Entry for a deleted document: `before` only.
    pub fn deleted(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        actor_id: Option<String>,
        actor: ActorInfo,
        before: Document,
    ) -> Self {
        Self {
            action: AuditAction::Delete,
            collection: collection.into(),
            doc_id: doc_id.into(),
            actor_id,
            actor_name: actor.actor_name,
            actor_email: actor.actor_email,
            before: Some(before),
            after: None,
            changed_fields: None,
        }
    }
}

/// A persisted audit entry (collection `audit_logs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub action: AuditAction,
    pub collection: String,
    pub doc_id: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_name: Option<String>,
    #[serde(default)]
    pub actor_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_fields: Option<Vec<String>>,
    /// Server-assigned write time; the only ordering key
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    /// Materialize a new entry with its store-assigned id and timestamp.
    pub fn from_new(id: ObjectId, entry: NewAuditLog, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            action: entry.action,
            collection: entry.collection,
            doc_id: entry.doc_id,
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            actor_email: entry.actor_email,
            before: entry.before,
            after: entry.after,
            changed_fields: entry.changed_fields,
            timestamp,
        }
    }

    /// True when the entry names an actor but carries no display attribution.
    pub fn needs_actor_enrichment(&self) -> bool {
        !is_blank(self.actor_id.as_deref())
            && is_blank(self.actor_name.as_deref())
            && is_blank(self.actor_email.as_deref())
    }
}

/// The only sanctioned mutation of a persisted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorPatch {
    pub id: ObjectId,
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
}

impl ActorPatch {
    pub fn new(id: ObjectId, actor: &ActorInfo) -> Self {
        Self {
            id,
            actor_name: actor.actor_name.clone(),
            actor_email: actor.actor_email.clone(),
        }
    }
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}
