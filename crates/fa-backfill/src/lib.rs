//! FieldAudit actor backfill
//!
//! Offline repair of audit entries that carry an `actorId` but no
//! `actorName`/`actorEmail`. Dry run unless explicitly applied.

pub mod credentials;
pub mod job;
pub mod report;

pub use credentials::{CredentialError, ServiceAccount};
pub use job::{
    BackfillError, BackfillJob, BackfillOptions, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, MAX_LIMIT,
    MAX_SINCE_DAYS,
};
pub use report::BackfillReport;
