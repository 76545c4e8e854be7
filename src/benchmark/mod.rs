//! Benchmark execution.
//!
//! - [`backoff`]: retry policy for rate-limited calls
//! - [`runner`]: one (model, sample, repetition) run with budget settlement and scoring
//! - [`executor`]: all runs of a benchmark under concurrency limits

pub mod backoff;
pub mod executor;
pub mod runner;

pub use backoff::{with_backoff, with_backoff_rng, BackoffOptions, RateLimitSignal};
pub use executor::{
    BenchmarkExecutor, BenchmarkJob, BenchmarkOutcome, ExecutorConfig, SkipReason, SkippedRun,
};
pub use runner::{
    score_output, BenchmarkRunner, RunError, RunParams, RunResult, RunScore, RunStatus, Sample,
};
