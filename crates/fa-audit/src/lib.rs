//! FieldAudit core
//!
//! Turns observed document changes into append-only audit entries:
//! - [`actor`]: who made the change, resolved against user profiles
//! - [`diff`] / [`snapshot`]: which top-level fields changed
//! - [`writer`] / [`repository`]: append the entry to `audit_logs`

pub mod actor;
pub mod diff;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod snapshot;
pub mod writer;

pub use actor::{
    extract_actor_id, ActorInfo, ActorResolver, InMemoryUserDirectory, MongoUserDirectory,
    UserDirectory, UserProfile,
};
pub use diff::{diff_fields, FieldValue, Snapshot, TimestampLike};
pub use entity::{ActorPatch, AuditAction, AuditLog, NewAuditLog};
pub use error::{AuditError, Result};
pub use repository::{AuditLogStore, InMemoryAuditLogStore, MongoAuditLogStore};
pub use snapshot::{changed_fields, snapshot};
pub use writer::AuditLogWriter;
