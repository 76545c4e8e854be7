//! # vlm_bench
//!
//! Budget-aware benchmarking of vision models on structured data extraction.
//!
//! This library provides:
//! - A concurrent executor that runs every model against every sample image
//! - A shared budget tracker that refuses calls beyond a soft ceiling and stops at a hard one
//! - Field-level scoring of model output against ground truth
//! - Planning helpers that pick models and run counts for a budget
//! - Report aggregation with a recommended model
//!
//! ## Architecture
//!
//! ```text
//!   BenchmarkPlan ──► recommend_models ──► BenchmarkJob
//!                                              │
//!                                              ▼
//!        ┌───────────────────────────────────────────┐
//!        │             BenchmarkExecutor             │
//!        │  per-model + global semaphores, cancel    │
//!        └────────────────────┬──────────────────────┘
//!                             │  one task per run
//!                             ▼
//!        ┌────────────────┐   reserve/record   ┌───────────────┐
//!        │ BenchmarkRunner│ ◄────────────────► │ BudgetTracker │
//!        └───────┬────────┘                    └───────────────┘
//!                │ with_backoff
//!                ▼
//!        ModelInvoker (OpenRouter / mock)
//!                │
//!                ▼
//!        scoring ──► report (aggregate, error patterns, recommendation)
//! ```
//!
//! ## Modules
//! - `benchmark`: backoff, single-run pipeline, concurrent executor
//! - `budget`: reservation ledger and model pricing
//! - `config`: environment settings and YAML benchmark plans
//! - `llm`: model invokers
//! - `planning`: presets, cost estimation, model recommendation
//! - `report`: per-model summaries and recommendations
//! - `schema`: consistency checks on examples and schemas
//! - `scoring`: canonical comparison and field accuracy

pub mod benchmark;
pub mod budget;
pub mod config;
pub mod llm;
pub mod planning;
pub mod report;
pub mod schema;
pub mod scoring;

pub use benchmark::{
    BenchmarkExecutor, BenchmarkJob, BenchmarkOutcome, BenchmarkRunner, RunResult, Sample,
};
pub use budget::{BudgetTracker, ModelCatalog};
pub use config::{BenchmarkPlan, Config, ConfigError};
pub use llm::{InvokeError, MockInvoker, ModelInvoker, OpenRouterInvoker};
pub use report::ReportData;
