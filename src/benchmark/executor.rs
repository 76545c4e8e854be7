//! Concurrent benchmark executor.
//!
//! Every (model, sample, repetition) triple becomes a tokio task. Tasks are
//! bounded by one semaphore per model and a global semaphore, and share one
//! [`BudgetTracker`]. Before reserving, a task checks the hard ceiling and the
//! cancellation token; once either trips no new call starts, while calls
//! already in flight finish and settle their reservations normally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::backoff::BackoffOptions;
use super::runner::{BenchmarkRunner, RunError, RunParams, RunResult, Sample};
use crate::budget::{BudgetError, BudgetSummary, BudgetTracker, ModelCatalog};
use crate::llm::ModelInvoker;
use crate::scoring::ComparisonMode;

/// Concurrency and retry settings for one benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub per_model_concurrency: usize,
    pub global_concurrency: usize,
    pub comparison_mode: ComparisonMode,
    pub backoff: BackoffOptions,
    /// Upper bound on one call including retries
    pub call_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            per_model_concurrency: 3,
            global_concurrency: 10,
            comparison_mode: ComparisonMode::Strict,
            backoff: BackoffOptions::default(),
            call_timeout: None,
        }
    }
}

/// What to run: every model against every sample, `runs_per_model` times.
#[derive(Debug, Clone)]
pub struct BenchmarkJob {
    pub models: Vec<String>,
    pub samples: Vec<Sample>,
    pub runs_per_model: u32,
    pub prompt: String,
    pub schema: Value,
}

/// Why a run never started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The soft ceiling refused the reservation
    BudgetExceeded { message: String },
    /// Confirmed spend reached the hard ceiling
    HardCeiling,
    Cancelled,
}

impl SkipReason {
    /// Whether this skip means the benchmark stopped early.
    pub fn is_abort(&self) -> bool {
        !matches!(self, Self::BudgetExceeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRun {
    pub model_id: String,
    pub sample_index: usize,
    pub repetition: u32,
    pub reason: SkipReason,
}

/// Everything one benchmark produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkOutcome {
    /// Ordered by model (job order), then sample, then repetition
    pub results: Vec<RunResult>,
    pub skipped: Vec<SkippedRun>,
    pub budget: BudgetSummary,
    /// Hard ceiling reached or cancelled before every run started
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BenchmarkOutcome {
    pub fn total_cost(&self) -> f64 {
        self.results.iter().map(|r| r.actual_cost).sum()
    }
}

enum TaskOutcome {
    Finished(RunResult),
    Skipped(SkippedRun),
}

/// State shared by every task of one benchmark.
struct Shared {
    runner: Arc<BenchmarkRunner>,
    job: Arc<BenchmarkJob>,
    tracker: Arc<BudgetTracker>,
    global: Arc<Semaphore>,
    cancel: CancellationToken,
}

struct RunSlot {
    model_id: String,
    sample_index: usize,
    repetition: u32,
}

impl RunSlot {
    fn skipped(self, reason: SkipReason) -> TaskOutcome {
        TaskOutcome::Skipped(SkippedRun {
            model_id: self.model_id,
            sample_index: self.sample_index,
            repetition: self.repetition,
            reason,
        })
    }
}

async fn run_slot(
    shared: Arc<Shared>,
    model_slots: Arc<Semaphore>,
    slot: RunSlot,
) -> Result<TaskOutcome, RunError> {
    // Model slot first so a saturated model does not hold global permits.
    let _model_permit = model_slots
        .acquire_owned()
        .await
        .map_err(|e| RunError::Task(e.to_string()))?;
    let _global_permit = Arc::clone(&shared.global)
        .acquire_owned()
        .await
        .map_err(|e| RunError::Task(e.to_string()))?;

    if shared.cancel.is_cancelled() {
        return Ok(slot.skipped(SkipReason::Cancelled));
    }
    if shared.tracker.should_abort() {
        return Ok(slot.skipped(SkipReason::HardCeiling));
    }

    let params = RunParams {
        model_id: &slot.model_id,
        sample: &shared.job.samples[slot.sample_index],
        sample_index: slot.sample_index,
        repetition: slot.repetition,
        prompt: &shared.job.prompt,
        schema: &shared.job.schema,
        tracker: &shared.tracker,
    };
    match shared.runner.run(params).await {
        Ok(result) => Ok(TaskOutcome::Finished(result)),
        Err(RunError::Budget(error @ BudgetError::BudgetExceeded { .. })) => {
            tracing::warn!(
                "Skipping {} sample {} repetition {}: {}",
                slot.model_id,
                slot.sample_index,
                slot.repetition,
                error
            );
            Ok(slot.skipped(SkipReason::BudgetExceeded {
                message: error.to_string(),
            }))
        }
        Err(error) => Err(error),
    }
}

/// Drives a [`BenchmarkJob`] through a [`BenchmarkRunner`].
pub struct BenchmarkExecutor {
    runner: Arc<BenchmarkRunner>,
    config: ExecutorConfig,
    cancel: CancellationToken,
}

impl BenchmarkExecutor {
    pub fn new(
        invoker: Arc<dyn ModelInvoker>,
        catalog: Arc<ModelCatalog>,
        config: ExecutorConfig,
    ) -> Self {
        let runner = BenchmarkRunner::new(invoker, catalog)
            .with_comparison_mode(config.comparison_mode)
            .with_backoff(config.backoff)
            .with_call_timeout(config.call_timeout);
        Self {
            runner: Arc::new(runner),
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Token that stops new runs from starting when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort every remaining task and wait until each one is gone. Dropping a
    /// run releases its reservation, so nothing stays held afterwards.
    async fn shut_down(tasks: &mut JoinSet<Result<TaskOutcome, RunError>>) {
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    /// Run the whole job against `tracker`.
    ///
    /// Budget refusals and aborts are reported as skipped runs. Only broken
    /// budget accounting or a crashed task is returned as an error.
    pub async fn execute(
        &self,
        job: BenchmarkJob,
        tracker: Arc<BudgetTracker>,
    ) -> Result<BenchmarkOutcome, RunError> {
        let started_at = Utc::now();
        let job = Arc::new(job);
        let global = Arc::new(Semaphore::new(self.config.global_concurrency.max(1)));
        let per_model: HashMap<&str, Arc<Semaphore>> = job
            .models
            .iter()
            .map(|m| {
                (
                    m.as_str(),
                    Arc::new(Semaphore::new(self.config.per_model_concurrency.max(1))),
                )
            })
            .collect();

        tracing::info!(
            "Starting benchmark: {} models x {} samples x {} runs, ${:.2} soft ceiling",
            job.models.len(),
            job.samples.len(),
            job.runs_per_model,
            tracker.soft_ceiling()
        );

        let shared = Arc::new(Shared {
            runner: Arc::clone(&self.runner),
            job: Arc::clone(&job),
            tracker: Arc::clone(&tracker),
            global,
            cancel: self.cancel.clone(),
        });

        let mut tasks = JoinSet::new();
        for model_id in &job.models {
            let model_slots = per_model
                .get(model_id.as_str())
                .cloned()
                .unwrap_or_else(|| Arc::new(Semaphore::new(1)));
            for sample_index in 0..job.samples.len() {
                for repetition in 0..job.runs_per_model {
                    let slot = RunSlot {
                        model_id: model_id.clone(),
                        sample_index,
                        repetition,
                    };
                    tasks.spawn(run_slot(Arc::clone(&shared), Arc::clone(&model_slots), slot));
                }
            }
        }

        let mut results = Vec::new();
        let mut skipped = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(error)) => {
                    tracing::error!("Benchmark stopped: {}", error);
                    Self::shut_down(&mut tasks).await;
                    return Err(error);
                }
                Err(join_error) => {
                    tracing::error!("Benchmark task crashed: {}", join_error);
                    Self::shut_down(&mut tasks).await;
                    return Err(RunError::Task(join_error.to_string()));
                }
            };
            match outcome {
                TaskOutcome::Finished(result) => results.push(result),
                TaskOutcome::Skipped(run) => skipped.push(run),
            }
        }

        let model_order: HashMap<&str, usize> = job
            .models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.as_str(), i))
            .collect();
        let order_key = |model_id: &str, sample_index: usize, repetition: u32| {
            (
                model_order.get(model_id).copied().unwrap_or(usize::MAX),
                sample_index,
                repetition,
            )
        };
        results.sort_by_key(|r| order_key(&r.model_id, r.sample_index, r.repetition));
        skipped.sort_by_key(|s| order_key(&s.model_id, s.sample_index, s.repetition));

        let aborted = skipped.iter().any(|s| s.reason.is_abort());
        let budget = tracker.summary();
        tracing::info!(
            "Benchmark finished: {} runs, {} skipped, ${:.4} spent{}",
            results.len(),
            skipped.len(),
            budget.spent,
            if aborted { " (aborted)" } else { "" }
        );

        Ok(BenchmarkOutcome {
            results,
            skipped,
            budget,
            aborted,
            started_at,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::RunStatus;
    use crate::budget::{ModelCandidate, PricingTier};
    use crate::llm::{InvokeError, InvokeRequest, Invocation};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always answers `{"total": 8}` after `delay`, tracking concurrency.
    #[derive(Default)]
    struct CountingInvoker {
        delay: Duration,
        fail_model: Option<String>,
        panic_model: Option<String>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ModelInvoker for CountingInvoker {
        async fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_model.as_deref() == Some(request.model_id.as_str()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
                panic!("invoker crashed for {}", request.model_id);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_model.as_deref() == Some(request.model_id.as_str()) {
                return Err(InvokeError::failure("upstream 500"));
            }
            Ok(Invocation {
                raw_text: r#"{"total": 8}"#.to_string(),
                input_tokens: 1500,
                output_tokens: 500,
                latency_ms: 300.0,
            })
        }
    }

    /// Two models at $0.0025 per call.
    fn catalog() -> Arc<ModelCatalog> {
        Arc::new(ModelCatalog::new(vec![
            ModelCandidate::new("a/one", "One", "a", PricingTier::Mid, 1.0, 2.0),
            ModelCandidate::new("b/two", "Two", "b", PricingTier::Budget, 1.0, 2.0),
        ]))
    }

    fn job(models: &[&str], samples: usize, runs: u32) -> BenchmarkJob {
        BenchmarkJob {
            models: models.iter().map(|m| m.to_string()).collect(),
            samples: (0..samples)
                .map(|i| Sample::new(format!("https://x/{}.png", i), json!({"total": 8})))
                .collect(),
            runs_per_model: runs,
            prompt: "Extract".to_string(),
            schema: json!({"properties": {"total": {"type": "number"}}}),
        }
    }

    fn executor(invoker: Arc<CountingInvoker>, config: ExecutorConfig) -> BenchmarkExecutor {
        BenchmarkExecutor::new(invoker, catalog(), config)
    }

    #[tokio::test]
    async fn test_runs_every_combination_in_order() {
        let invoker = Arc::new(CountingInvoker::default());
        let executor = executor(invoker.clone(), ExecutorConfig::default());
        let tracker = Arc::new(BudgetTracker::new(1.0));

        let outcome = executor
            .execute(job(&["b/two", "a/one"], 2, 2), tracker.clone())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 8);
        assert!(outcome.skipped.is_empty());
        assert!(!outcome.aborted);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 8);
        let order: Vec<(&str, usize, u32)> = outcome
            .results
            .iter()
            .map(|r| (r.model_id.as_str(), r.sample_index, r.repetition))
            .collect();
        assert_eq!(order[0], ("b/two", 0, 0));
        assert_eq!(order[3], ("b/two", 1, 1));
        assert_eq!(order[4], ("a/one", 0, 0));
        assert!(outcome.results.iter().all(|r| r.field_accuracy() == 100.0));

        assert!((outcome.budget.spent - 0.02).abs() < 1e-9);
        assert!((outcome.total_cost() - 0.02).abs() < 1e-9);
        assert_eq!(tracker.live_reservations(), 0);
        assert!(outcome.completed_at >= outcome.started_at);
    }

    #[tokio::test]
    async fn test_soft_ceiling_skips_runs() {
        let invoker = Arc::new(CountingInvoker::default());
        let executor = executor(invoker.clone(), ExecutorConfig::default());
        // Room for two calls at $0.0025.
        let tracker = Arc::new(BudgetTracker::new(0.00625));

        let outcome = executor.execute(job(&["a/one"], 3, 2), tracker.clone()).await.unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.skipped.len(), 4);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| matches!(s.reason, SkipReason::BudgetExceeded { .. })));
        assert!(!outcome.aborted);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert!(tracker.spent() <= tracker.soft_ceiling());
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test]
    async fn test_hard_ceiling_aborts_remaining_runs() {
        let invoker = Arc::new(CountingInvoker::default());
        let config = ExecutorConfig {
            per_model_concurrency: 1,
            global_concurrency: 1,
            ..ExecutorConfig::default()
        };
        let executor = executor(invoker.clone(), config);
        let tracker = Arc::new(BudgetTracker::with_hard_ceiling(1.0, 0.004));

        let outcome = executor.execute(job(&["a/one"], 1, 5), tracker).await.unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.skipped.len(), 3);
        assert!(outcome.skipped.iter().all(|s| s.reason == SkipReason::HardCeiling));
        assert!(outcome.aborted);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let invoker = Arc::new(CountingInvoker::default());
        let executor = executor(invoker.clone(), ExecutorConfig::default());
        executor.cancellation_token().cancel();

        let outcome = executor
            .execute(job(&["a/one", "b/two"], 2, 1), Arc::new(BudgetTracker::new(1.0)))
            .await
            .unwrap();

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.skipped.len(), 4);
        assert!(outcome.aborted);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_model_does_not_stop_others() {
        let invoker = Arc::new(CountingInvoker {
            fail_model: Some("a/one".to_string()),
            ..CountingInvoker::default()
        });
        let executor = executor(invoker, ExecutorConfig::default());
        let tracker = Arc::new(BudgetTracker::new(1.0));

        let outcome = executor
            .execute(job(&["a/one", "b/two"], 1, 2), tracker.clone())
            .await
            .unwrap();

        let failed = outcome.results.iter().filter(|r| r.status == RunStatus::Failed).count();
        assert_eq!(failed, 2);
        assert_eq!(outcome.results.len(), 4);
        assert!((tracker.spent() - 0.005).abs() < 1e-9);
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_model_concurrency_bound() {
        let invoker = Arc::new(CountingInvoker {
            delay: Duration::from_millis(100),
            ..CountingInvoker::default()
        });
        let config = ExecutorConfig {
            per_model_concurrency: 2,
            global_concurrency: 10,
            ..ExecutorConfig::default()
        };
        let executor = executor(invoker.clone(), config);

        let outcome = executor
            .execute(job(&["a/one"], 3, 3), Arc::new(BudgetTracker::new(1.0)))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 9);
        assert_eq!(invoker.max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_concurrency_bound() {
        let invoker = Arc::new(CountingInvoker {
            delay: Duration::from_millis(100),
            ..CountingInvoker::default()
        });
        let config = ExecutorConfig {
            per_model_concurrency: 3,
            global_concurrency: 2,
            ..ExecutorConfig::default()
        };
        let executor = executor(invoker.clone(), config);

        let outcome = executor
            .execute(job(&["a/one", "b/two"], 2, 2), Arc::new(BudgetTracker::new(1.0)))
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 8);
        assert!(invoker.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_task_leaves_no_reservation() {
        let invoker = Arc::new(CountingInvoker {
            delay: Duration::from_millis(200),
            panic_model: Some("b/two".to_string()),
            ..CountingInvoker::default()
        });
        let executor = executor(invoker.clone(), ExecutorConfig::default());
        let tracker = Arc::new(BudgetTracker::new(1.0));

        let result = executor.execute(job(&["a/one", "b/two"], 1, 1), tracker.clone()).await;

        assert!(matches!(result, Err(RunError::Task(_))));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.live_reservations(), 0);
        assert_eq!(tracker.reserved(), 0.0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test]
    async fn test_empty_job() {
        let invoker = Arc::new(CountingInvoker::default());
        let executor = executor(invoker, ExecutorConfig::default());
        let outcome = executor
            .execute(job(&[], 2, 2), Arc::new(BudgetTracker::new(1.0)))
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(!outcome.aborted);
        assert_eq!(outcome.budget.remaining, 1.0);
    }

    #[test]
    fn test_config_defaults() {
        let config: ExecutorConfig =
            serde_json::from_value(json!({"global_concurrency": 4})).unwrap();
        assert_eq!(config.global_concurrency, 4);
        assert_eq!(config.per_model_concurrency, 3);
        assert_eq!(config.comparison_mode, ComparisonMode::Strict);
    }
}
