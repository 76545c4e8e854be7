//! Scoring module - JSON canonicalization, comparison and field accuracy.
//!
//! Two comparison modes:
//! - Strict: exact match after canonicalization (null != missing, "1" != 1)
//! - Relaxed: loose coercion (null == missing, "1" == 1, whitespace collapsed)
//!
//! Scoring never fails: a missing or extra field is a diff, not an error.

mod canonical;
mod fields;

pub use canonical::{canonicalize, compare, compare_relaxed, compare_strict, ComparisonMode};
pub use fields::{calculate_field_accuracy, diff_fields, flatten, FieldAccuracy, FieldDiff};
