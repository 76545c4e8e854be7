//! Cost estimation and run-count optimization.

use serde::{Deserialize, Serialize};

use crate::budget::pricing::PRICES_AS_OF_DATE;
use crate::budget::ModelCandidate;

/// Average seconds per call, queue time included.
pub const AVG_SECONDS_PER_RUN: f64 = 3.0;

/// Concurrent calls assumed for time estimates.
pub const PARALLELISM_FACTOR: f64 = 3.0;

/// Fewer runs than this give no meaningful statistics.
pub const MIN_OPTIMIZED_RUNS: u32 = 3;

/// Diminishing returns beyond this.
pub const MAX_OPTIMIZED_RUNS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn for_runs(runs_per_model: u32) -> Self {
        match runs_per_model {
            0..=2 => Self::Low,
            3..=5 => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CostEstimateInput<'a> {
    pub models: &'a [ModelCandidate],
    /// Runs per model per sample
    pub runs_per_model: u32,
    pub sample_count: u32,
    pub budget_ceiling: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// USD, rounded to 4 decimals
    pub estimated_cost: f64,
    pub total_runs: u64,
    pub estimated_time_minutes: u64,
    pub confidence_level: ConfidenceLevel,
    /// Percent of the ceiling, rounded to 1 decimal; may exceed 100
    pub budget_utilization: f64,
    pub warning: Option<String>,
    /// Unrounded, in model order
    pub per_model_cost: Vec<f64>,
    pub prices_as_of: String,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Cost of one call for display, rounded to 6 decimals.
pub fn model_cost_per_run(model: &ModelCandidate) -> f64 {
    round_to(model.estimated_call_cost(), 6)
}

pub fn estimate_cost(input: CostEstimateInput<'_>) -> CostEstimate {
    if input.models.is_empty() {
        return CostEstimate {
            estimated_cost: 0.0,
            total_runs: 0,
            estimated_time_minutes: 0,
            confidence_level: ConfidenceLevel::Low,
            budget_utilization: 0.0,
            warning: None,
            per_model_cost: Vec::new(),
            prices_as_of: PRICES_AS_OF_DATE.to_string(),
        };
    }

    let calls_per_model = input.runs_per_model as f64 * input.sample_count as f64;
    let per_model_cost: Vec<f64> = input
        .models
        .iter()
        .map(|m| m.estimated_call_cost() * calls_per_model)
        .collect();
    let estimated_cost: f64 = per_model_cost.iter().sum();

    let total_runs =
        input.models.len() as u64 * input.runs_per_model as u64 * input.sample_count as u64;
    let total_seconds = total_runs as f64 * AVG_SECONDS_PER_RUN / PARALLELISM_FACTOR;
    let estimated_time_minutes = (total_seconds / 60.0).ceil() as u64;

    let budget_utilization = if input.budget_ceiling > 0.0 {
        estimated_cost / input.budget_ceiling * 100.0
    } else {
        0.0
    };

    let warning = (estimated_cost > input.budget_ceiling).then(|| {
        format!(
            "Estimated cost exceeds the ${:.2} budget. The system will optimize runs per model to fit within budget.",
            input.budget_ceiling
        )
    });

    CostEstimate {
        estimated_cost: round_to(estimated_cost, 4),
        total_runs,
        estimated_time_minutes,
        confidence_level: ConfidenceLevel::for_runs(input.runs_per_model),
        budget_utilization: round_to(budget_utilization, 1),
        warning,
        per_model_cost,
        prices_as_of: PRICES_AS_OF_DATE.to_string(),
    }
}

/// Largest run count whose full pass over all models and samples fits `budget`,
/// clamped to `MIN_OPTIMIZED_RUNS..=MAX_OPTIMIZED_RUNS`.
pub fn optimize_runs_for_budget(models: &[ModelCandidate], sample_count: u32, budget: f64) -> u32 {
    if models.is_empty() || sample_count == 0 {
        return MIN_OPTIMIZED_RUNS;
    }

    let pass_cost: f64 =
        models.iter().map(|m| m.estimated_call_cost()).sum::<f64>() * sample_count as f64;
    if pass_cost == 0.0 {
        return MAX_OPTIMIZED_RUNS;
    }

    let affordable = (budget / pass_cost).floor();
    if affordable >= MAX_OPTIMIZED_RUNS as f64 {
        MAX_OPTIMIZED_RUNS
    } else if affordable <= MIN_OPTIMIZED_RUNS as f64 {
        MIN_OPTIMIZED_RUNS
    } else {
        affordable as u32
    }
}
