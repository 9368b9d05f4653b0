//! Prometheus-compatible counters for the audit pipeline

use metrics::counter;

use crate::AuditAction;

/// Record an audit entry appended to the log
pub fn record_entry_written(collection: &str, action: AuditAction) {
    counter!(
        "fa_audit_entries_written_total",
        "collection" => collection.to_string(),
        "action" => action.as_str()
    )
    .increment(1);
}

/// Record a failed append (the triggering event will be redelivered)
pub fn record_write_failure(collection: &str) {
    counter!(
        "fa_audit_write_failures_total",
        "collection" => collection.to_string()
    )
    .increment(1);
}

/// Record a user profile lookup that errored and degraded to null attribution
pub fn record_actor_lookup_failure() {
    counter!("fa_actor_lookup_failures_total").increment(1);
}
