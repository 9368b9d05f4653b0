//! Backfill job
//!
//! Scans recent audit entries, resolves each distinct actor once, and
//! patches only `actorName`/`actorEmail` in bounded batches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use fa_audit::{ActorInfo, ActorPatch, ActorResolver, AuditError, AuditLogStore};

use crate::report::BackfillReport;

/// Default patches per committed batch
pub const DEFAULT_BATCH_SIZE: usize = 400;
/// Hard per-batch write ceiling
pub const MAX_BATCH_SIZE: usize = 500;
/// Longest lookback window, in days
pub const MAX_SINCE_DAYS: i64 = 36_500;
/// Most entries a single run may scan
pub const MAX_LIMIT: i64 = 100_000;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("Invalid backfill options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Store(#[from] AuditError),
}

pub type Result<T> = std::result::Result<T, BackfillError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillOptions {
    pub since_days: i64,
    pub limit: i64,
    pub batch_size: usize,
    /// Write patches; otherwise only report them
    pub apply: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            since_days: 180,
            limit: 2000,
            batch_size: DEFAULT_BATCH_SIZE,
            apply: false,
        }
    }
}

impl BackfillOptions {
    /// Batch size clamped to `1..=MAX_BATCH_SIZE`
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    /// Reject windows and limits the store would misread. A limit of 0
    /// means "no limit" to MongoDB.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SINCE_DAYS).contains(&self.since_days) {
            return Err(BackfillError::InvalidOptions(format!(
                "since_days must be between 1 and {}, got {}",
                MAX_SINCE_DAYS, self.since_days
            )));
        }
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(BackfillError::InvalidOptions(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        Ok(())
    }

    /// Start of the scan window relative to `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_days(self.since_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                BackfillError::InvalidOptions(format!(
                    "since_days {} is out of range",
                    self.since_days
                ))
            })
    }
}

/// Cached outcome of one actor lookup
#[derive(Debug, Clone)]
enum Lookup {
    Resolved(ActorInfo),
    Unresolved,
    Failed,
}

pub struct BackfillJob {
    store: Arc<dyn AuditLogStore>,
    resolver: ActorResolver,
    options: BackfillOptions,
}

impl BackfillJob {
    pub fn new(store: Arc<dyn AuditLogStore>, resolver: ActorResolver, options: BackfillOptions) -> Self {
        Self { store, resolver, options }
    }

    pub fn options(&self) -> &BackfillOptions {
        &self.options
    }

    /// Run once. Lookup failures skip the entry; store failures abort the run.
    pub async fn run(&self) -> Result<BackfillReport> {
        self.options.validate()?;
        let since = self.options.window_start(Utc::now())?;
        let entries = self.store.find_since(since, self.options.limit).await?;

        let mut report = BackfillReport {
            scanned: entries.len(),
            applied: self.options.apply,
            ..Default::default()
        };
        info!(
            scanned = report.scanned,
            since = %since,
            limit = self.options.limit,
            "Scanned audit log"
        );

        let mut cache: HashMap<String, Lookup> = HashMap::new();
        let mut patches = Vec::new();

        for entry in entries.iter().filter(|e| e.needs_actor_enrichment()) {
            let Some(actor_id) = entry.actor_id.as_deref() else {
                continue;
            };
            report.candidates += 1;

            let lookup = match cache.get(actor_id) {
                Some(cached) => cached.clone(),
                None => {
                    let lookup = self.lookup(actor_id).await;
                    cache.insert(actor_id.to_string(), lookup.clone());
                    lookup
                }
            };

            match lookup {
                Lookup::Resolved(actor) => patches.push(ActorPatch::new(entry.id, &actor)),
                Lookup::Unresolved => {
                    debug!(id = %entry.id, actor_id, "No profile for actor, leaving entry as is");
                    report.unresolved += 1;
                }
                Lookup::Failed => {
                    warn!(id = %entry.id, actor_id, "Skipping entry after failed actor lookup");
                    report.lookup_failures += 1;
                }
            }
        }

        info!(
            candidates = report.candidates,
            patches = patches.len(),
            distinct_actors = cache.len(),
            "Resolved actors"
        );

        if !self.options.apply {
            report.updated = patches.len();
            info!(would_update = report.updated, "Dry run, no entries written");
            return Ok(report);
        }

        for (index, batch) in patches.chunks(self.options.effective_batch_size()).enumerate() {
            let written = self.store.apply_actor_patches(batch).await?;
            report.updated += written;
            report.batches_committed += 1;
            info!(batch = index + 1, size = batch.len(), written, "Committed backfill batch");
        }

        Ok(report)
    }

    async fn lookup(&self, actor_id: &str) -> Lookup {
        match self.resolver.try_resolve(Some(actor_id)).await {
            Ok(actor) if actor.is_resolved() => Lookup::Resolved(actor),
            Ok(_) => Lookup::Unresolved,
            Err(e) => {
                fa_audit::metrics::record_actor_lookup_failure();
                warn!(actor_id, error = %e, "Actor lookup failed");
                Lookup::Failed
            }
        }
    }
}
