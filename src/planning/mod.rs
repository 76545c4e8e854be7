//! Planning module - what to run before spending anything.
//!
//! # Key Concepts
//! - Presets: strategy trade-offs between model count and runs per model
//! - Estimator: a-priori cost, run count and time for a configuration
//! - Recommender: priority-weighted model selection that fits the budget

pub mod estimator;
pub mod presets;
pub mod recommender;

pub use estimator::{
    estimate_cost, model_cost_per_run, optimize_runs_for_budget, ConfidenceLevel, CostEstimate,
    CostEstimateInput,
};
pub use presets::{builtin_presets, find_preset, CountRange, Priority, Strategy, StrategyPreset};
pub use recommender::{recommend_models, score_model, RecommendConfig, RecommendedModelSet};
