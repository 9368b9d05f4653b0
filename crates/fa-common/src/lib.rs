//! Shared building blocks for the FieldAudit services.

pub mod logging;

// ============================================================================
// Collection names
// ============================================================================

/// Product collections instrumented for audit logging.
///
/// The list is compiled in: adding a collection means shipping a new
/// trigger processor, never a config change.
pub const WATCHED_COLLECTIONS: &[&str] = &[
    "activations",
    "projects",
    "outlets",
    "sales_report_quick",
    "sales_report_detail",
    "task_attendance",
    "task_early_assessment",
    "tasks",
];

/// Append-only destination for audit entries.
pub const AUDIT_LOGS_COLLECTION: &str = "audit_logs";

/// User profiles, keyed by user id.
pub const USERS_COLLECTION: &str = "users";

/// Resume token checkpoints for the change stream watchers.
pub const CHECKPOINTS_COLLECTION: &str = "audit_stream_checkpoints";

/// Returns true if `name` is one of the watched product collections.
pub fn is_watched_collection(name: &str) -> bool {
    WATCHED_COLLECTIONS.contains(&name)
}
