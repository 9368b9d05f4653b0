//! Field Diff
//!
//! Compares two flat snapshots and reports the top-level keys whose values
//! differ. Timestamp values are compared by their canonical ISO-8601 form,
//! so two representations of the same instant are equal. Everything else is
//! compared structurally as JSON, with whole-valued floats folded into
//! integers so `1`, `1i64` and `1.0` compare equal. Nested values are never
//! diffed field-by-field; a change anywhere inside marks the whole key.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A value that denotes an instant in time.
///
/// Store-specific timestamp types implement this at the boundary so the
/// diff never inspects vendor shapes.
pub trait TimestampLike {
    /// ISO-8601, UTC, millisecond precision
    fn to_canonical_string(&self) -> String;
}

impl TimestampLike for DateTime<Utc> {
    fn to_canonical_string(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// A top-level field value as seen by the diff
pub enum FieldValue<'a> {
    Timestamp(&'a dyn TimestampLike),
    Plain(Value),
}

impl FieldValue<'_> {
    /// The form used for comparison
    pub fn normalized(&self) -> Value {
        match self {
            Self::Timestamp(ts) => Value::String(ts.to_canonical_string()),
            Self::Plain(value) => canonical_numbers(value),
        }
    }
}

/// Largest magnitude at which every whole `f64` is exact
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Rewrite whole, finite floats as integers, recursively.
fn canonical_numbers(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical_numbers(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

impl std::fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timestamp(ts) => f.debug_tuple("Timestamp").field(&ts.to_canonical_string()).finish(),
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
        }
    }
}

/// A point-in-time view of a document's top-level fields
pub type Snapshot<'a> = BTreeMap<String, FieldValue<'a>>;

/// Keys present in either snapshot whose normalized values differ.
///
/// A key missing on one side differs from any present value, including
/// an explicit null. The result is sorted.
pub fn diff_fields(before: &Snapshot<'_>, after: &Snapshot<'_>) -> Vec<String> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    keys.into_iter()
        .filter(|key| {
            let old = before.get(*key).map(FieldValue::normalized);
            let new = after.get(*key).map(FieldValue::normalized);
            old != new
        })
        .cloned()
        .collect()
}
