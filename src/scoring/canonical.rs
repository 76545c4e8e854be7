//! Canonical form and document-level comparison.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Equivalence policy used when scoring model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    #[default]
    Strict,
    Relaxed,
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Relaxed => write!(f, "relaxed"),
        }
    }
}

/// Integral numbers become integers so `8.0` and `8` are the same value.
pub(crate) fn canonical_number(n: &Number) -> Value {
    if n.is_i64() || n.is_u64() {
        return Value::Number(n.clone());
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
            Value::from(f as i64)
        }
        _ => Value::Number(n.clone()),
    }
}

fn canonical_f64(f: f64) -> Value {
    Number::from_f64(f)
        .map(|n| canonical_number(&n))
        .unwrap_or(Value::Null)
}

/// Recursively canonicalize a JSON value.
///
/// Object keys end up sorted, strings are trimmed, numbers normalized, array
/// order preserved. No type coercion.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::Bool(*b),
        Value::Number(n) => canonical_number(n),
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
    }
}

/// Strict comparison: canonicalize both sides, then deep-equal.
pub fn compare_strict(expected: &Value, actual: &Value) -> bool {
    canonicalize(expected) == canonicalize(actual)
}

/// Read a whole string as a number: decimal and exponent forms plus `0x`,
/// `0o` and `0b` integer literals. Infinities stay strings since JSON cannot
/// hold them.
fn parse_numeric(s: &str) -> Option<f64> {
    let radix = match s.get(..2).map(str::to_ascii_lowercase).as_deref() {
        Some("0x") => Some(16),
        Some("0o") => Some(8),
        Some("0b") => Some(2),
        _ => None,
    };
    let parsed = match radix {
        Some(radix) => {
            let digits = &s[2..];
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return None;
            }
            u64::from_str_radix(digits, radix).ok().map(|n| n as f64)
        }
        None => s.parse::<f64>().ok(),
    };
    parsed.filter(|n| n.is_finite())
}

/// Normalize for relaxed comparison: numeric strings become numbers,
/// whitespace runs collapse, case is kept.
pub(crate) fn relax_normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
            match parse_numeric(&collapsed) {
                Some(num) => canonical_f64(num),
                None => Value::String(collapsed),
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(relax_normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), relax_normalize(v)))
                .collect(),
        ),
        other => canonicalize(other),
    }
}

/// Fill keys present on only one side with explicit null on the other.
fn unify_null_missing(a: &Map<String, Value>, b: &Map<String, Value>) -> (Value, Value) {
    let mut unified_a = a.clone();
    let mut unified_b = b.clone();
    for key in a.keys() {
        unified_b.entry(key.clone()).or_insert(Value::Null);
    }
    for key in b.keys() {
        unified_a.entry(key.clone()).or_insert(Value::Null);
    }
    (Value::Object(unified_a), Value::Object(unified_b))
}

/// Relaxed comparison: `"1" == 1`, `"8.00" == 8`, collapsed whitespace,
/// null equals a missing key, case-sensitive.
pub fn compare_relaxed(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(e), Value::Object(a)) => {
            let (e, a) = unify_null_missing(e, a);
            relax_normalize(&e) == relax_normalize(&a)
        }
        _ => relax_normalize(expected) == relax_normalize(actual),
    }
}

/// Document-level comparison under `mode`.
pub fn compare(expected: &Value, actual: &Value, mode: ComparisonMode) -> bool {
    match mode {
        ComparisonMode::Strict => compare_strict(expected, actual),
        ComparisonMode::Relaxed => compare_relaxed(expected, actual),
    }
}

/// Compare two leaves where `None` means the path is absent on that side.
pub(crate) fn leaves_match(
    expected: Option<&Value>,
    actual: Option<&Value>,
    mode: ComparisonMode,
) -> bool {
    match mode {
        ComparisonMode::Strict => match (expected, actual) {
            (Some(e), Some(a)) => canonicalize(e) == canonicalize(a),
            (None, None) => true,
            _ => false,
        },
        ComparisonMode::Relaxed => {
            let e = expected.map(relax_normalize).unwrap_or(Value::Null);
            let a = actual.map(relax_normalize).unwrap_or(Value::Null);
            e == a
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_sorts_keys_recursively() {
        let value = json!({"b": {"d": 1, "c": 2}, "a": 3});
        assert_eq!(
            canonicalize(&value).to_string(),
            r#"{"a":3,"b":{"c":2,"d":1}}"#
        );
    }

    #[test]
    fn test_canonicalize_numbers_and_strings() {
        assert_eq!(canonicalize(&json!(8.0)), json!(8));
        assert_eq!(canonicalize(&json!(3.1)), json!(3.1));
        assert_eq!(canonicalize(&json!("8.00")), json!("8.00"));
        assert_eq!(canonicalize(&json!("  hello  ")), json!("hello"));
    }

    #[test]
    fn test_canonicalize_scalars_and_empty_containers() {
        assert_eq!(canonicalize(&Value::Null), Value::Null);
        assert_eq!(canonicalize(&json!(true)), json!(true));
        assert_eq!(canonicalize(&json!({})), json!({}));
        assert_eq!(canonicalize(&json!([])), json!([]));
        assert_eq!(
            canonicalize(&json!([{"b": 1, "a": 2}, 3, "hello"])),
            json!([{"a": 2, "b": 1}, 3, "hello"])
        );
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let values = [
            json!({"z": [1.0, " x ", {"k": null}], "a": 2.50, "m": false}),
            json!([[], {}, -0.0, 1e300, "  "]),
            json!("  padded "),
        ];
        for value in values {
            let once = canonicalize(&value);
            assert_eq!(canonicalize(&once), once);
        }
    }

    #[test]
    fn test_compare_strict() {
        assert!(compare_strict(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
        assert!(!compare_strict(&json!({"a": 1}), &json!({"a": 2})));
        assert!(!compare_strict(&json!({"a": null}), &json!({})));
        assert!(!compare_strict(&json!({"a": 1}), &json!({"a": "1"})));
        assert!(compare_strict(&json!({"a": "  hello  "}), &json!({"a": "hello"})));
        assert!(compare_strict(&json!({"a": 8.0}), &json!({"a": 8})));
    }

    #[test]
    fn test_compare_relaxed() {
        assert!(compare_relaxed(&json!({"a": 1}), &json!({"a": "1"})));
        assert!(compare_relaxed(&json!({"a": 1}), &json!({"a": 1.0})));
        assert!(compare_relaxed(&json!({"a": "8.00"}), &json!({"a": 8})));
        assert!(compare_relaxed(&json!({"a": null}), &json!({})));
        assert!(compare_relaxed(&json!({}), &json!({"a": null})));
        assert!(compare_relaxed(&json!({"a": "New  York"}), &json!({"a": "New York"})));
        assert!(!compare_relaxed(&json!({"a": "New York"}), &json!({"a": "new york"})));
        assert!(compare_relaxed(&json!({"a": "  hello  "}), &json!({"a": "hello"})));
        assert!(!compare_relaxed(&json!({"a": 1}), &json!({})));
    }

    #[test]
    fn test_compare_relaxed_nested() {
        assert!(compare_relaxed(
            &json!({"a": ["1", " x  y "], "b": {"c": "2.50"}}),
            &json!({"a": [1, "x y"], "b": {"c": 2.5}})
        ));
        assert!(!compare_relaxed(
            &json!({"a": ["1", "x"]}),
            &json!({"a": ["x", 1]})
        ));
        // null stands in for a missing key at the top level only
        assert!(!compare_relaxed(&json!({"a": {"b": null}}), &json!({"a": {}})));
        assert!(compare_relaxed(&json!({"a": {"b": null}}), &json!({"a": {"b": null}})));
    }

    #[test]
    fn test_relaxed_does_not_coerce_non_numeric() {
        assert_eq!(relax_normalize(&json!("inf")), json!("inf"));
        assert_eq!(relax_normalize(&json!("Infinity")), json!("Infinity"));
        assert_eq!(relax_normalize(&json!("NaN")), json!("NaN"));
        assert_eq!(relax_normalize(&json!("   ")), json!(""));
        assert_eq!(relax_normalize(&json!(" 12.50 ")), json!(12.5));
        assert_eq!(relax_normalize(&json!("0x")), json!("0x"));
        assert_eq!(relax_normalize(&json!("0x+5")), json!("0x+5"));
        assert_eq!(relax_normalize(&json!("0b102")), json!("0b102"));
    }

    #[test]
    fn test_relaxed_integer_literals() {
        assert_eq!(relax_normalize(&json!("0x10")), json!(16));
        assert_eq!(relax_normalize(&json!("0XfF")), json!(255));
        assert_eq!(relax_normalize(&json!("0o17")), json!(15));
        assert_eq!(relax_normalize(&json!("0b101")), json!(5));
        assert_eq!(relax_normalize(&json!("1e3")), json!(1000));
        assert!(compare_relaxed(&json!({"id": "0x10"}), &json!({"id": 16})));
    }

    #[test]
    fn test_leaves_match_missing_vs_null() {
        assert!(!leaves_match(Some(&Value::Null), None, ComparisonMode::Strict));
        assert!(leaves_match(Some(&Value::Null), None, ComparisonMode::Relaxed));
        assert!(!leaves_match(Some(&json!(1)), None, ComparisonMode::Relaxed));
    }
}
