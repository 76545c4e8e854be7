//! Report module - turns scored runs into ranked summaries.
//!
//! # Key Concepts
//! - Aggregate: per-model accuracy, cost, latency and spread
//! - Error patterns: which fields each model gets wrong, and how
//! - Recommendation: the model to pick for the user's top priority, with rationale
//!
//! Every function here is pure: runs in, report data out.

pub mod aggregate;
pub mod error_patterns;
pub mod recommendation;

pub use aggregate::{aggregate, build_report, group_by_model, model_field_errors};
pub use error_patterns::aggregate_error_patterns;
pub use recommendation::{generate_rationale, select_recommended};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::planning::Priority;

/// Aggregated results of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_id: String,
    pub model_name: String,
    pub provider: String,
    pub tier: String,
    /// Mean field accuracy, 0-100
    pub accuracy: f64,
    /// Share of completed runs that matched exactly, 0-100
    pub exact_match_rate: f64,
    /// Mean actual cost in USD
    pub cost_per_run: f64,
    pub median_latency: f64,
    pub p95_latency: f64,
    /// Population standard deviation of field accuracy
    pub spread: f64,
    pub runs_completed: usize,
    pub runs_attempted: usize,
}

/// A distinct (field, expected, actual) error and how often it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldErrorSummary {
    pub field_path: String,
    pub expected: String,
    pub actual: String,
    pub occurrences: usize,
    /// Percent of completed runs
    pub percentage: f64,
}

/// A field one model gets wrong repeatedly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub model_name: String,
    pub model_id: String,
    pub field_path: String,
    /// Runs that got this field wrong
    pub occurrences: usize,
    pub total_runs: usize,
    pub percentage: f64,
    pub common_expected: String,
    /// Most frequent wrong value
    pub common_actual: String,
}

/// Everything a report page needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    /// Accuracy descending
    pub models: Vec<ModelSummary>,
    pub recommended_model_id: Option<String>,
    pub total_api_cost: f64,
    pub rationale: String,
    pub priorities: Vec<Priority>,
    pub image_count: usize,
    pub model_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
