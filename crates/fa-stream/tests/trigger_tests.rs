//! Trigger pipeline tests
//!
//! Change event → registry → handler → actor resolution → audit log,
//! against the in-memory stores.

use std::sync::Arc;

use bson::doc;
use fa_audit::{
    ActorResolver, AuditAction, AuditLogWriter, InMemoryAuditLogStore, InMemoryUserDirectory,
    UserProfile,
};
use fa_stream::{
    AuditTrigger, ChangeEvent, ChangeKind, EventProcessor, HandlerOutcome, MemoryCheckpointStore,
    TriggerRegistry, WatcherConfig,
};

struct Harness {
    registry: Arc<TriggerRegistry>,
    store: Arc<InMemoryAuditLogStore>,
    directory: Arc<InMemoryUserDirectory>,
}

fn profile(first: &str, last: &str, email: &str) -> UserProfile {
    UserProfile {
        email: Some(email.to_string()),
        first_name: Some(first.to_string()),
        last_name: Some(last.to_string()),
        display_name: None,
    }
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryAuditLogStore::new());
    let directory = Arc::new(InMemoryUserDirectory::new());
    directory.add_user("u1", profile("John", "Doe", "j@x.com"));
    directory.add_user("u2", profile("Sari", "Dewi", "sari@x.com"));

    let trigger = AuditTrigger::new(
        ActorResolver::new(directory.clone()),
        AuditLogWriter::new(store.clone()),
    );
    Harness {
        registry: Arc::new(TriggerRegistry::for_watched_collections(Arc::new(trigger))),
        store,
        directory,
    }
}

#[tokio::test]
async fn test_task_lifecycle_is_logged() {
    let h = harness();

    let created = doc! { "_id": "t1", "remark": "a", "createdBy": "u1" };
    let updated = doc! { "_id": "t1", "remark": "b", "createdBy": "u1", "updatedBy": "u2" };

    h.registry
        .dispatch(ChangeEvent::created("tasks", "t1", created.clone()))
        .await
        .unwrap();
    h.registry
        .dispatch(ChangeEvent::updated("tasks", "t1", created.clone(), updated.clone()))
        .await
        .unwrap();
    h.registry
        .dispatch(ChangeEvent::deleted("tasks", "t1", updated.clone()))
        .await
        .unwrap();

    let entries = h.store.entries();
    assert_eq!(entries.len(), 3);

    let create = &entries[0];
    assert_eq!(create.action, AuditAction::Create);
    assert_eq!(create.collection, "tasks");
    assert_eq!(create.doc_id, "t1");
    assert_eq!(create.actor_id.as_deref(), Some("u1"));
    assert_eq!(create.actor_name.as_deref(), Some("John Doe"));
    assert_eq!(create.actor_email.as_deref(), Some("j@x.com"));
    assert_eq!(create.after.as_ref(), Some(&created));
    assert!(create.before.is_none());
    assert!(create.changed_fields.is_none());

    let update = &entries[1];
    assert_eq!(update.action, AuditAction::Update);
    assert_eq!(update.actor_id.as_deref(), Some("u2"));
    assert_eq!(update.actor_name.as_deref(), Some("Sari Dewi"));
    assert_eq!(
        update.changed_fields,
        Some(vec!["remark".to_string(), "updatedBy".to_string()])
    );
    assert_eq!(update.before.as_ref(), Some(&created));
    assert_eq!(update.after.as_ref(), Some(&updated));

    let delete = &entries[2];
    assert_eq!(delete.action, AuditAction::Delete);
    assert_eq!(delete.actor_id.as_deref(), Some("u2"));
    assert_eq!(delete.before.as_ref(), Some(&updated));
    assert!(delete.after.is_none());

    assert!(entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_update_reports_only_changed_field() {
    let h = harness();

    let before = doc! { "remark": "a", "createdBy": "u1" };
    let after = doc! { "remark": "b", "createdBy": "u1" };
    h.registry
        .dispatch(ChangeEvent::updated("tasks", "t1", before, after))
        .await
        .unwrap();

    let entry = &h.store.entries()[0];
    assert_eq!(entry.changed_fields, Some(vec!["remark".to_string()]));
    assert_eq!(entry.actor_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_update_with_only_timestamp_representation_change() {
    let h = harness();

    let before = doc! { "visitedAt": bson::DateTime::from_millis(1_714_552_200_000) };
    let after = doc! { "visitedAt": bson::Timestamp { time: 1_714_552_200, increment: 4 } };
    h.registry
        .dispatch(ChangeEvent::updated("task_attendance", "a1", before, after))
        .await
        .unwrap();

    let entry = &h.store.entries()[0];
    assert_eq!(entry.changed_fields, Some(Vec::new()));
}

#[tokio::test]
async fn test_empty_events_write_nothing() {
    let h = harness();

    for kind in [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete] {
        let outcome = h
            .registry
            .dispatch(ChangeEvent::empty("outlets", "o1", kind))
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Empty);
    }

    assert!(h.store.entries().is_empty());
    assert!(h.directory.lookups().is_empty());
}

#[tokio::test]
async fn test_document_without_actor_is_logged_unattributed() {
    let h = harness();

    h.registry
        .dispatch(ChangeEvent::created("projects", "p1", doc! { "name": "Q3 launch" }))
        .await
        .unwrap();

    let entry = &h.store.entries()[0];
    assert_eq!(entry.actor_id, None);
    assert_eq!(entry.actor_name, None);
    assert_eq!(entry.actor_email, None);
    assert!(!entry.needs_actor_enrichment());
    assert!(h.directory.lookups().is_empty());
}

#[tokio::test]
async fn test_unknown_actor_keeps_id_without_attribution() {
    let h = harness();

    h.registry
        .dispatch(ChangeEvent::created("outlets", "o1", doc! { "createdBy": "u9" }))
        .await
        .unwrap();

    let entry = &h.store.entries()[0];
    assert_eq!(entry.actor_id.as_deref(), Some("u9"));
    assert_eq!(entry.actor_name, None);
    assert!(entry.needs_actor_enrichment());
}

#[tokio::test]
async fn test_failed_write_is_redelivered() {
    let h = harness();
    let checkpoints = MemoryCheckpointStore::new();
    let processor = EventProcessor::new(
        &WatcherConfig::for_collection("fieldaudit", "tasks"),
        Arc::new(checkpoints.clone()),
        h.registry.clone(),
    );
    let event = ChangeEvent::created("tasks", "t1", doc! { "createdBy": "u1" });

    h.store.set_fail_appends(true);
    assert!(processor
        .process(Some(event.clone()), Some(doc! { "_data": "01" }))
        .await
        .is_err());
    assert!(h.store.entries().is_empty());

    // Redelivery after reconnect
    h.store.set_fail_appends(false);
    processor
        .process(Some(event), Some(doc! { "_data": "01" }))
        .await
        .unwrap();
    assert_eq!(h.store.entries().len(), 1);
}
