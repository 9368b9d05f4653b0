use std::fmt;

/// Counts from one backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Entries read within the lookback window
    pub scanned: usize,
    /// Entries with an actor id but no attribution
    pub candidates: usize,
    /// Patches staged (dry run) or written (apply)
    pub updated: usize,
    /// Candidates whose actor has no usable profile
    pub unresolved: usize,
    /// Candidates skipped because the profile lookup failed
    pub lookup_failures: usize,
    pub batches_committed: usize,
    pub applied: bool,
}

impl BackfillReport {
    pub fn mode(&self) -> &'static str {
        if self.applied {
            "apply"
        } else {
            "dry-run"
        }
    }
}

impl fmt::Display for BackfillReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode={} scanned={} candidates={} updated={} unresolved={} lookup_failures={} batches={}",
            self.mode(),
            self.scanned,
            self.candidates,
            self.updated,
            self.unresolved,
            self.lookup_failures,
            self.batches_committed
        )
    }
}
