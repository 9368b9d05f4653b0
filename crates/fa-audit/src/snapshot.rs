//! BSON snapshot adapter
//!
//! Maps a BSON document onto the store-neutral [`Snapshot`] used by the diff.
//! BSON `DateTime` and `Timestamp` values become [`FieldValue::Timestamp`];
//! everything else is carried as relaxed extended JSON.

use bson::{Bson, Document};
use chrono::{DateTime, Utc};

use crate::diff::{diff_fields, FieldValue, Snapshot, TimestampLike};

impl TimestampLike for bson::DateTime {
    fn to_canonical_string(&self) -> String {
        self.to_chrono().to_canonical_string()
    }
}

impl TimestampLike for bson::Timestamp {
    fn to_canonical_string(&self) -> String {
        // `increment` orders operations within a second; it is not a sub-second part
        DateTime::<Utc>::from_timestamp(i64::from(self.time), 0)
            .map(|dt| dt.to_canonical_string())
            .unwrap_or_else(|| format!("Timestamp({}, {})", self.time, self.increment))
    }
}

/// Build a diffable snapshot of a document's top-level fields.
pub fn snapshot(doc: &Document) -> Snapshot<'_> {
    doc.iter()
        .map(|(key, value)| {
            let field = match value {
                Bson::DateTime(dt) => FieldValue::Timestamp(dt),
                Bson::Timestamp(ts) => FieldValue::Timestamp(ts),
                other => FieldValue::Plain(other.clone().into_relaxed_extjson()),
            };
            (key.clone(), field)
        })
        .collect()
}

/// Top-level fields that differ between two document images.
pub fn changed_fields(before: &Document, after: &Document) -> Vec<String> {
    diff_fields(&snapshot(before), &snapshot(after))
}
