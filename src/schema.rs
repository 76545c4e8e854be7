//! Consistency checks on ground-truth examples and their JSON schema.
//!
//! A benchmark scores every image against one schema. These checks warn when
//! the ground truths disagree on shape so the user can fix them before paying for
//! calls. They never fail.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    /// True when there are no warnings
    pub compatible: bool,
    pub warnings: Vec<String>,
}

impl CompatibilityResult {
    fn from_warnings(warnings: Vec<String>) -> Self {
        Self {
            compatible: warnings.is_empty(),
            warnings,
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Distinct items in first-seen order.
fn distinct<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Compare the top level of each image's expected output.
///
/// Warns when a key is present for some images but not others, or when a key
/// (or the top-level value itself) changes type between images. Image numbers
/// in warnings are 1-based.
pub fn check_schema_compatibility(examples: &[Value]) -> CompatibilityResult {
    if examples.len() < 2 {
        return CompatibilityResult::from_warnings(Vec::new());
    }

    let objects: Vec<(usize, &Map<String, Value>)> = examples
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.as_object().map(|o| (i, o)))
        .collect();

    let mut warnings = Vec::new();
    if objects.len() < 2 {
        let types = distinct(examples.iter().map(type_name));
        if types.len() > 1 {
            warnings.push(format!(
                "Top-level JSON types differ across images: {}. All images should use the same structure.",
                types.join(", ")
            ));
        }
        return CompatibilityResult::from_warnings(warnings);
    }

    let all_keys: BTreeSet<&String> = objects.iter().flat_map(|(_, o)| o.keys()).collect();

    for key in &all_keys {
        let missing: Vec<String> = objects
            .iter()
            .filter(|(_, o)| !o.contains_key(key.as_str()))
            .map(|(i, _)| (i + 1).to_string())
            .collect();
        if !missing.is_empty() && missing.len() < objects.len() {
            warnings.push(format!(
                "Field \"{}\" is missing from image(s) {}. A single report uses one schema across all images.",
                key,
                missing.join(", ")
            ));
        }
    }

    for key in &all_keys {
        let types = distinct(
            objects
                .iter()
                .filter_map(|(_, o)| o.get(key.as_str()))
                .map(type_name),
        );
        if types.len() > 1 {
            warnings.push(format!(
                "Field \"{}\" has inconsistent types across images: {}. This may cause inaccurate benchmarking.",
                key,
                types.join(", ")
            ));
        }
    }

    CompatibilityResult::from_warnings(warnings)
}

fn union_warning(path: &str, types: &[&str]) -> String {
    format!(
        "Field \"{}\" has different types across your images ({}). Pick one format.",
        path,
        types.join(", ")
    )
}

fn scan_properties(properties: &Map<String, Value>, prefix: &str, warnings: &mut Vec<String>) {
    for (key, prop) in properties {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        if let Some(variants) = prop.get("anyOf").and_then(Value::as_array) {
            let types: Vec<&str> = variants
                .iter()
                .filter_map(|v| v.get("type").and_then(Value::as_str))
                .filter(|t| !t.is_empty())
                .collect();
            if types.len() > 1 {
                warnings.push(union_warning(&path, &types));
            }
        }

        if let Some(listed) = prop.get("type").and_then(Value::as_array) {
            let types: Vec<&str> = listed
                .iter()
                .filter_map(Value::as_str)
                .filter(|t| *t != "null")
                .collect();
            if types.len() > 1 {
                warnings.push(union_warning(&path, &types));
            }
        }

        if prop.get("type").and_then(Value::as_str) == Some("object") {
            if let Some(nested) = prop.get("properties").and_then(Value::as_object) {
                scan_properties(nested, &path, warnings);
            }
        }
    }
}

/// Warn about fields whose schema allows several types (`anyOf`, or a `type`
/// list with more than one non-null entry). Nested object properties are
/// scanned with dotted paths.
pub fn check_schema_for_union_types(schema: &Value) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        scan_properties(properties, "", &mut warnings);
    }
    warnings
}
