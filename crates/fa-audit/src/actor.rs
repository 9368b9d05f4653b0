//! Actor Resolution
//!
//! Picks the acting user id off a document and turns it into display
//! attribution from the `users` collection. Resolution never fails: a
//! missing profile or a lookup error degrades to null name/email.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use mongodb::{Client, Collection};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuditError, Result};

/// Field naming the user behind the latest mutation
pub const UPDATED_BY_FIELD: &str = "updatedBy";
/// Field naming the user who created the document
pub const CREATED_BY_FIELD: &str = "createdBy";

/// User profile as stored in `users`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Display attribution written onto audit entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorInfo {
    pub actor_name: Option<String>,
    pub actor_email: Option<String>,
}

impl ActorInfo {
    pub fn unresolved() -> Self {
        Self::default()
    }

    /// Derive attribution from a profile.
    ///
    /// Name precedence: "first last" (trimmed), then `displayName`, then email.
    pub fn from_profile(profile: &UserProfile) -> Self {
        let actor_email = non_empty(profile.email.as_deref());

        let full_name = format!(
            "{} {}",
            profile.first_name.as_deref().unwrap_or(""),
            profile.last_name.as_deref().unwrap_or("")
        );
        let actor_name = non_empty(Some(full_name.trim()))
            .or_else(|| non_empty(profile.display_name.as_deref()))
            .or_else(|| actor_email.clone());

        Self { actor_name, actor_email }
    }

    /// True if at least one attribution field is known.
    pub fn is_resolved(&self) -> bool {
        self.actor_name.is_some() || self.actor_email.is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(String::from)
}

/// Extract the acting user id from a document snapshot.
///
/// `updatedBy` wins over `createdBy`; empty values count as absent.
pub fn extract_actor_id(doc: &Document) -> Option<String> {
    actor_field(doc, UPDATED_BY_FIELD).or_else(|| actor_field(doc, CREATED_BY_FIELD))
}

fn actor_field(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key) {
        Some(Bson::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Bson::ObjectId(oid)) => Some(oid.to_hex()),
        _ => None,
    }
}

/// Read-only access to user profiles
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

/// Resolves actor ids to display attribution
#[derive(Clone)]
pub struct ActorResolver {
    directory: Arc<dyn UserDirectory>,
}

impl ActorResolver {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve without ever failing; lookup errors degrade to nulls.
    pub async fn resolve(&self, actor_id: Option<&str>) -> ActorInfo {
        match self.try_resolve(actor_id).await {
            Ok(actor) => actor,
            Err(e) => {
                crate::metrics::record_actor_lookup_failure();
                warn!(actor_id = ?actor_id, error = %e, "Actor lookup failed, writing without attribution");
                ActorInfo::unresolved()
            }
        }
    }

    /// Resolve, surfacing lookup errors to the caller.
    ///
    /// An empty id or a missing profile is not an error.
    pub async fn try_resolve(&self, actor_id: Option<&str>) -> Result<ActorInfo> {
        let Some(actor_id) = actor_id.filter(|id| !id.is_empty()) else {
            return Ok(ActorInfo::unresolved());
        };

        match self.directory.find_user(actor_id).await? {
            Some(profile) => Ok(ActorInfo::from_profile(&profile)),
            None => {
                debug!(actor_id, "No user profile for actor");
                Ok(ActorInfo::unresolved())
            }
        }
    }
}

// ============================================================================
// MongoDB User Directory
// ============================================================================

pub struct MongoUserDirectory {
    collection: Collection<UserProfile>,
}

impl MongoUserDirectory {
    pub fn new(client: &Client, db_name: &str, collection_name: &str) -> Self {
        Self {
            collection: client.database(db_name).collection(collection_name),
        }
    }
}

/// Match `_id` stored as a string, or as an ObjectId when the id is hex.
fn user_id_filter(user_id: &str) -> Document {
    match ObjectId::parse_str(user_id) {
        Ok(oid) => doc! { "_id": { "$in": [user_id, oid] } },
        Err(_) => doc! { "_id": user_id },
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.collection.find_one(user_id_filter(user_id)).await?)
    }
}

// ============================================================================
// In-Memory User Directory (for testing/development)
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserProfile>>,
    failing: RwLock<HashSet<String>>,
    lookups: RwLock<Vec<String>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: &str, profile: UserProfile) {
        self.users.write().insert(user_id.to_string(), profile);
    }

    /// Make every lookup of `user_id` fail with a store error.
    pub fn fail_lookups_for(&self, user_id: &str) {
        self.failing.write().insert(user_id.to_string());
    }

    /// Ids looked up so far, in call order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.read().clone()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.lookups.write().push(user_id.to_string());
        if self.failing.read().contains(user_id) {
            return Err(AuditError::unavailable(format!("lookup of user {} failed", user_id)));
        }
        Ok(self.users.read().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(first: &str, last: &str, display: &str, email: &str) -> UserProfile {
        let opt = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        UserProfile {
            email: opt(email),
            first_name: opt(first),
            last_name: opt(last),
            display_name: opt(display),
        }
    }

    fn resolver_with(directory: InMemoryUserDirectory) -> (ActorResolver, Arc<InMemoryUserDirectory>) {
        let directory = Arc::new(directory);
        (ActorResolver::new(directory.clone()), directory)
    }

    #[test]
    fn test_extract_prefers_updated_by() {
        let doc = doc! { "createdBy": "u1", "updatedBy": "u2" };
        assert_eq!(extract_actor_id(&doc), Some("u2".to_string()));
    }

    #[test]
    fn test_extract_falls_back_to_created_by() {
        assert_eq!(extract_actor_id(&doc! { "createdBy": "u1" }), Some("u1".to_string()));
        assert_eq!(
            extract_actor_id(&doc! { "createdBy": "u1", "updatedBy": "" }),
            Some("u1".to_string())
        );
        assert_eq!(
            extract_actor_id(&doc! { "createdBy": "u1", "updatedBy": Bson::Null }),
            Some("u1".to_string())
        );
    }

    #[test]
    fn test_extract_none_without_actor_fields() {
        assert_eq!(extract_actor_id(&doc! { "remark": "a" }), None);
        assert_eq!(extract_actor_id(&doc! { "createdBy": 42 }), None);
    }

    #[test]
    fn test_hex_user_id_matches_string_or_object_id() {
        let oid = ObjectId::parse_str("65f1c2a9e4b0a1b2c3d4e5f6").unwrap();
        assert_eq!(
            user_id_filter("65f1c2a9e4b0a1b2c3d4e5f6"),
            doc! { "_id": { "$in": ["65f1c2a9e4b0a1b2c3d4e5f6", oid] } }
        );
        assert_eq!(user_id_filter("u1"), doc! { "_id": "u1" });
    }

    #[test]
    fn test_name_from_first_and_last() {
        let actor = ActorInfo::from_profile(&profile("John", "Doe", "JD", "j@x.com"));
        assert_eq!(actor.actor_name.as_deref(), Some("John Doe"));
        assert_eq!(actor.actor_email.as_deref(), Some("j@x.com"));
    }

    #[test]
    fn test_name_with_only_one_part_is_trimmed() {
        let actor = ActorInfo::from_profile(&profile("", "Doe", "", ""));
        assert_eq!(actor.actor_name.as_deref(), Some("Doe"));
        assert_eq!(actor.actor_email, None);
    }

    #[test]
    fn test_name_falls_back_to_display_name() {
        let actor = ActorInfo::from_profile(&profile("", "", "JD", "j@x.com"));
        assert_eq!(actor.actor_name.as_deref(), Some("JD"));
    }

    #[test]
    fn test_name_falls_back_to_email() {
        let actor = ActorInfo::from_profile(&profile("", "", "", "j@x.com"));
        assert_eq!(actor.actor_name.as_deref(), Some("j@x.com"));
        assert_eq!(actor.actor_email.as_deref(), Some("j@x.com"));
    }

    #[test]
    fn test_empty_profile_is_unresolved() {
        let actor = ActorInfo::from_profile(&UserProfile::default());
        assert_eq!(actor, ActorInfo::unresolved());
        assert!(!actor.is_resolved());
    }

    #[tokio::test]
    async fn test_resolve_null_skips_lookup() {
        let (resolver, directory) = resolver_with(InMemoryUserDirectory::new());

        assert_eq!(resolver.resolve(None).await, ActorInfo::unresolved());
        assert_eq!(resolver.resolve(Some("")).await, ActorInfo::unresolved());
        assert!(directory.lookups().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_missing_profile() {
        let (resolver, _) = resolver_with(InMemoryUserDirectory::new());

        assert_eq!(resolver.resolve(Some("ghost")).await, ActorInfo::unresolved());
        assert_eq!(resolver.try_resolve(Some("ghost")).await.unwrap(), ActorInfo::unresolved());
    }

    #[tokio::test]
    async fn test_resolve_known_profile() {
        let directory = InMemoryUserDirectory::new();
        directory.add_user("u1", profile("John", "Doe", "", "j@x.com"));
        let (resolver, _) = resolver_with(directory);

        let actor = resolver.resolve(Some("u1")).await;
        assert_eq!(actor.actor_name.as_deref(), Some("John Doe"));
        assert_eq!(actor.actor_email.as_deref(), Some("j@x.com"));
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades_to_nulls() {
        let directory = InMemoryUserDirectory::new();
        directory.add_user("u1", profile("John", "Doe", "", "j@x.com"));
        directory.fail_lookups_for("u1");
        let (resolver, _) = resolver_with(directory);

        assert_eq!(resolver.resolve(Some("u1")).await, ActorInfo::unresolved());
        assert!(resolver.try_resolve(Some("u1")).await.is_err());
    }
}
