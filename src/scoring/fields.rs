//! Field-level accuracy and diffs.
//!
//! Documents are flattened to leaf paths (`address.city`, `items[0].price`)
//! and compared leaf by leaf over the union of paths from both sides. A field
//! the model invented is therefore scored exactly like a wrong field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::canonical::{canonical_number, leaves_match, ComparisonMode};

/// A single mismatching field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field_path: String,
    pub expected: String,
    pub actual: String,
}

impl FieldDiff {
    pub fn new(
        field_path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAccuracy {
    /// Rounded percentage, 0-100
    pub accuracy: u32,
    pub total_fields: usize,
    pub correct_fields: usize,
}

fn flatten_into(value: &Value, prefix: &str, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(item, &format!("{}[{}]", prefix, i), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(item, &path, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

/// Flatten a JSON value to `path -> leaf`.
///
/// A bare leaf maps to the empty path; empty containers contribute nothing.
pub fn flatten(value: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    flatten_into(value, "", &mut out);
    out
}

/// Sorted union of paths with the leaf on each side, if present.
fn paired_leaves<'a>(
    expected: &'a BTreeMap<String, Value>,
    actual: &'a BTreeMap<String, Value>,
) -> impl Iterator<Item = (&'a String, Option<&'a Value>, Option<&'a Value>)> {
    let paths: BTreeSet<&String> = expected.keys().chain(actual.keys()).collect();
    paths
        .into_iter()
        .map(move |path| (path, expected.get(path), actual.get(path)))
}

/// Share of matching leaves across both documents.
pub fn calculate_field_accuracy(
    expected: &Value,
    actual: &Value,
    mode: ComparisonMode,
) -> FieldAccuracy {
    let expected_flat = flatten(expected);
    let actual_flat = flatten(actual);

    let mut total_fields = 0;
    let mut correct_fields = 0;
    for (_, e, a) in paired_leaves(&expected_flat, &actual_flat) {
        total_fields += 1;
        if leaves_match(e, a, mode) {
            correct_fields += 1;
        }
    }

    let accuracy = if total_fields > 0 {
        (correct_fields as f64 / total_fields as f64 * 100.0).round() as u32
    } else {
        100
    };

    FieldAccuracy {
        accuracy,
        total_fields,
        correct_fields,
    }
}

/// Render a leaf for display in a diff.
fn render(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => Value::String(s.clone()).to_string(),
        Some(Value::Number(n)) => canonical_number(n).to_string(),
        Some(other) => other.to_string(),
    }
}

/// Every mismatching field, sorted by path.
pub fn diff_fields(expected: &Value, actual: &Value, mode: ComparisonMode) -> Vec<FieldDiff> {
    let expected_flat = flatten(expected);
    let actual_flat = flatten(actual);

    paired_leaves(&expected_flat, &actual_flat)
        .filter(|(_, e, a)| !leaves_match(*e, *a, mode))
        .map(|(path, e, a)| FieldDiff::new(path.clone(), render(e), render(a)))
        .collect()
}
