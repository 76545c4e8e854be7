//! One benchmark run: reserve budget, call the model, settle the reservation,
//! score the output against ground truth.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::backoff::{with_backoff, BackoffOptions};
use crate::budget::{BudgetError, BudgetResult, BudgetTracker, ModelCatalog, ReservationId};
use crate::llm::{InvokeError, InvokeRequest, Invocation, ModelInvoker};
use crate::scoring::{
    calculate_field_accuracy, compare_strict, diff_fields, ComparisonMode, FieldDiff,
};

/// Reservation size for a model missing from the catalog.
const UNKNOWN_MODEL_CALL_COST: f64 = 0.01;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    #[error("Run task failed: {0}")]
    Task(String),
}

impl RunError {
    /// A refused reservation. The run is skipped, the benchmark continues.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, Self::Budget(BudgetError::BudgetExceeded { .. }))
    }
}

/// One benchmark image and its expected extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// URL (or other reference) the invoker can resolve
    pub image_ref: String,
    pub ground_truth: Value,
}

impl Sample {
    pub fn new(image_ref: impl Into<String>, ground_truth: Value) -> Self {
        Self {
            image_ref: image_ref.into(),
            ground_truth,
        }
    }
}

/// Inputs to a single run.
#[derive(Debug, Clone, Copy)]
pub struct RunParams<'a> {
    pub model_id: &'a str,
    pub sample: &'a Sample,
    pub sample_index: usize,
    pub repetition: u32,
    pub prompt: &'a str,
    pub schema: &'a Value,
    pub tracker: &'a BudgetTracker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Complete,
    Failed,
}

/// Score of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunScore {
    /// 0-100
    pub field_accuracy: u32,
    pub exact_match: bool,
    pub field_errors: Vec<FieldDiff>,
}

/// Immutable record of one (model, sample, repetition) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub model_id: String,
    pub sample_index: usize,
    pub repetition: u32,
    pub status: RunStatus,
    /// Parsed output, or the raw text as a JSON string when it did not parse
    pub output_json: Value,
    pub is_valid_json: bool,
    pub response_time_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub actual_cost: f64,
    pub error: Option<String>,
    /// Present for completed runs only
    pub score: Option<RunScore>,
}

impl RunResult {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    pub fn field_accuracy(&self) -> f64 {
        self.score.as_ref().map(|s| s.field_accuracy as f64).unwrap_or(0.0)
    }

    pub fn exact_match(&self) -> bool {
        self.score.as_ref().map(|s| s.exact_match).unwrap_or(false)
    }

    pub fn field_errors(&self) -> &[FieldDiff] {
        self.score.as_ref().map(|s| s.field_errors.as_slice()).unwrap_or(&[])
    }
}

/// Score model output against ground truth.
///
/// Output that was not valid JSON scores 0 and every expected field is
/// reported as missing.
pub fn score_output(
    expected: &Value,
    output: &Value,
    is_valid_json: bool,
    mode: ComparisonMode,
) -> RunScore {
    if !is_valid_json {
        return RunScore {
            field_accuracy: 0,
            exact_match: false,
            field_errors: diff_fields(expected, &json!({}), mode),
        };
    }

    RunScore {
        field_accuracy: calculate_field_accuracy(expected, output, mode).accuracy,
        exact_match: compare_strict(expected, output),
        field_errors: diff_fields(expected, output, mode),
    }
}

/// A live reservation. Released on drop unless settled first, so a run that
/// is aborted or panics mid-call never leaves budget held.
struct ReservationGuard<'a> {
    tracker: &'a BudgetTracker,
    id: Option<ReservationId>,
}

impl<'a> ReservationGuard<'a> {
    fn reserve(tracker: &'a BudgetTracker, estimated_cost: f64) -> BudgetResult<Self> {
        let id = tracker.reserve(estimated_cost)?;
        Ok(Self { tracker, id: Some(id) })
    }

    fn record(mut self, actual_cost: f64) -> BudgetResult<()> {
        match self.id.take() {
            Some(id) => self.tracker.record(id, actual_cost),
            None => Ok(()),
        }
    }

    fn release(mut self) -> BudgetResult<()> {
        match self.id.take() {
            Some(id) => self.tracker.release(id),
            None => Ok(()),
        }
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            match self.tracker.release(id) {
                Ok(()) => tracing::debug!("Released abandoned reservation {}", id),
                Err(e) => tracing::error!("Failed to release abandoned reservation {}: {}", id, e),
            }
        }
    }
}

/// Executes single runs against a [`ModelInvoker`].
pub struct BenchmarkRunner {
    invoker: Arc<dyn ModelInvoker>,
    catalog: Arc<ModelCatalog>,
    comparison_mode: ComparisonMode,
    backoff: BackoffOptions,
    call_timeout: Option<Duration>,
}

impl BenchmarkRunner {
    pub fn new(invoker: Arc<dyn ModelInvoker>, catalog: Arc<ModelCatalog>) -> Self {
        Self {
            invoker,
            catalog,
            comparison_mode: ComparisonMode::default(),
            backoff: BackoffOptions::default(),
            call_timeout: None,
        }
    }

    pub fn with_comparison_mode(mut self, mode: ComparisonMode) -> Self {
        self.comparison_mode = mode;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffOptions) -> Self {
        self.backoff = backoff;
        self
    }

    /// Bound each call, retries included.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Amount reserved before calling `model_id`.
    pub fn estimated_call_cost(&self, model_id: &str) -> f64 {
        self.catalog
            .get(model_id)
            .map(|m| m.estimated_call_cost())
            .unwrap_or(UNKNOWN_MODEL_CALL_COST)
    }

    /// Cost of a finished call from its reported token usage.
    fn actual_cost(&self, model_id: &str, invocation: &Invocation) -> f64 {
        self.catalog
            .get(model_id)
            .map(|m| m.cost_for(invocation.input_tokens, invocation.output_tokens))
            .unwrap_or(0.0)
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
        let call = with_backoff(|| self.invoker.invoke(request), &self.backoff);
        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(InvokeError::failure(format!("Call timed out after {:?}", limit))),
            },
            None => call.await,
        }
    }

    /// Run one call.
    ///
    /// Transport failures become a `Failed` result. Errors are reserved for the
    /// budget: a refused reservation (`BudgetExceeded`) or broken accounting
    /// (`UnknownReservation`).
    pub async fn run(&self, params: RunParams<'_>) -> Result<RunResult, RunError> {
        let estimated = self.estimated_call_cost(params.model_id);
        let reservation = ReservationGuard::reserve(params.tracker, estimated)?;

        let request = InvokeRequest {
            model_id: params.model_id.to_string(),
            image_ref: params.sample.image_ref.clone(),
            prompt: params.prompt.to_string(),
            schema: params.schema.clone(),
        };

        let started = Instant::now();
        let invocation = match self.invoke(&request).await {
            Ok(invocation) => invocation,
            Err(error) => {
                reservation.release()?;
                tracing::warn!(
                    "Run failed for {} (sample {}, repetition {}): {}",
                    params.model_id,
                    params.sample_index,
                    params.repetition,
                    error
                );
                return Ok(RunResult {
                    model_id: params.model_id.to_string(),
                    sample_index: params.sample_index,
                    repetition: params.repetition,
                    status: RunStatus::Failed,
                    output_json: Value::Null,
                    is_valid_json: false,
                    response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                    input_tokens: 0,
                    output_tokens: 0,
                    actual_cost: 0.0,
                    error: Some(error.to_string()),
                    score: None,
                });
            }
        };

        let actual_cost = self.actual_cost(params.model_id, &invocation);
        reservation.record(actual_cost)?;

        let (output_json, is_valid_json) =
            match serde_json::from_str::<Value>(&invocation.raw_text) {
                Ok(parsed) => (parsed, true),
                Err(_) => (Value::String(invocation.raw_text.clone()), false),
            };
        let score = score_output(
            &params.sample.ground_truth,
            &output_json,
            is_valid_json,
            self.comparison_mode,
        );

        tracing::debug!(
            "{} sample {} repetition {}: accuracy {}%, ${:.6}, {:.0}ms",
            params.model_id,
            params.sample_index,
            params.repetition,
            score.field_accuracy,
            actual_cost,
            invocation.latency_ms
        );

        Ok(RunResult {
            model_id: params.model_id.to_string(),
            sample_index: params.sample_index,
            repetition: params.repetition,
            status: RunStatus::Complete,
            output_json,
            is_valid_json,
            response_time_ms: invocation.latency_ms,
            input_tokens: invocation.input_tokens,
            output_tokens: invocation.output_tokens,
            actual_cost,
            error: None,
            score: Some(score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{ModelCandidate, PricingTier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted responses, repeating the last one.
    struct ScriptedInvoker {
        responses: Mutex<Vec<Result<Invocation, InvokeError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedInvoker {
        fn new(responses: Vec<Result<Invocation, InvokeError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl ModelInvoker for ScriptedInvoker {
        async fn invoke(&self, _request: &InvokeRequest) -> Result<Invocation, InvokeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }
    }

    fn reply(raw_text: &str) -> Result<Invocation, InvokeError> {
        Ok(Invocation {
            raw_text: raw_text.to_string(),
            input_tokens: 1500,
            output_tokens: 500,
            latency_ms: 420.0,
        })
    }

    fn catalog() -> Arc<ModelCatalog> {
        Arc::new(ModelCatalog::new(vec![ModelCandidate::new(
            "test/model",
            "Test Model",
            "test",
            PricingTier::Mid,
            1.0,
            2.0,
        )]))
    }

    fn runner(invoker: ScriptedInvoker) -> (Arc<ScriptedInvoker>, BenchmarkRunner) {
        let invoker = Arc::new(invoker);
        let backoff = BackoffOptions {
            max_retries: 2,
            base_delay_ms: 10,
            max_delay_ms: 50,
        };
        let runner = BenchmarkRunner::new(invoker.clone(), catalog()).with_backoff(backoff);
        (invoker, runner)
    }

    fn params<'a>(
        model_id: &'a str,
        sample: &'a Sample,
        schema: &'a Value,
        tracker: &'a BudgetTracker,
    ) -> RunParams<'a> {
        RunParams {
            model_id,
            sample,
            sample_index: 0,
            repetition: 1,
            prompt: "Extract the receipt",
            schema,
            tracker,
        }
    }

    #[tokio::test]
    async fn test_completed_run_is_scored_and_recorded() {
        let (_, runner) = runner(ScriptedInvoker::new(vec![reply(
            r#"{"total": 8.0, "vendor": "Acme Inc"}"#,
        )]));
        let sample = Sample::new("https://x/1.png", json!({"total": 8, "vendor": "Acme"}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();

        assert_eq!(result.status, RunStatus::Complete);
        assert!(result.is_valid_json);
        assert_eq!(result.repetition, 1);
        assert_eq!(result.response_time_ms, 420.0);
        assert!((result.actual_cost - 0.0025).abs() < 1e-12);
        let score = result.score.unwrap();
        assert_eq!(score.field_accuracy, 50);
        assert!(!score.exact_match);
        assert_eq!(score.field_errors, vec![FieldDiff::new("vendor", "\"Acme\"", "\"Acme Inc\"")]);

        assert!((tracker.spent() - 0.0025).abs() < 1e-12);
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test]
    async fn test_exact_match_ignores_key_order_and_float_form() {
        let (_, runner) = runner(ScriptedInvoker::new(vec![reply(r#"{"b": 2.0, "a": " x "}"#)]));
        let sample = Sample::new("img", json!({"a": "x", "b": 2}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();
        assert!(result.exact_match());
        assert_eq!(result.field_accuracy(), 100.0);
    }

    #[tokio::test]
    async fn test_invalid_json_scores_zero() {
        let (_, runner) = runner(ScriptedInvoker::new(vec![reply("I cannot read this image")]));
        let sample = Sample::new("img", json!({"total": 8, "vendor": "Acme"}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();

        assert_eq!(result.status, RunStatus::Complete);
        assert!(!result.is_valid_json);
        assert_eq!(result.output_json, json!("I cannot read this image"));
        assert_eq!(result.field_accuracy(), 0.0);
        assert_eq!(
            result.field_errors(),
            &[
                FieldDiff::new("total", "8", "undefined"),
                FieldDiff::new("vendor", "\"Acme\"", "undefined"),
            ]
        );
        // The call still cost money.
        assert!(tracker.spent() > 0.0);
    }

    #[tokio::test]
    async fn test_transport_failure_releases_reservation() {
        let (invoker, runner) =
            runner(ScriptedInvoker::new(vec![Err(InvokeError::failure("connection reset"))]));
        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("connection reset"));
        assert!(result.score.is_none());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.spent(), 0.0);
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_is_retried_then_fails() {
        let (invoker, runner) = runner(ScriptedInvoker::new(vec![Err(
            InvokeError::rate_limited("slow down", None),
        )]));
        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("Rate limited: slow down"));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let (invoker, runner) = runner(ScriptedInvoker::new(vec![
            Err(InvokeError::rate_limited("slow down", None)),
            reply(r#"{"a": 1}"#),
        ]));
        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();
        assert!(result.is_complete());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_fails_run() {
        let mut invoker = ScriptedInvoker::new(vec![reply(r#"{"a": 1}"#)]);
        invoker.delay = Some(Duration::from_secs(10));
        let (_, runner) = runner(invoker);
        let runner = runner.with_call_timeout(Some(Duration::from_secs(1)));
        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let result = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_run_releases_reservation() {
        let mut invoker = ScriptedInvoker::new(vec![reply(r#"{"a": 1}"#)]);
        invoker.delay = Some(Duration::from_secs(10));
        let (invoker, runner) = runner(invoker);
        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);

        let run = runner.run(params("test/model", &sample, &schema, &tracker));
        assert!(tokio::time::timeout(Duration::from_secs(1), run).await.is_err());

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.live_reservations(), 0);
        assert_eq!(tracker.reserved(), 0.0);
        assert_eq!(tracker.spent(), 0.0);
    }

    #[tokio::test]
    async fn test_budget_refusal_is_an_error() {
        let (invoker, runner) = runner(ScriptedInvoker::new(vec![reply("{}")]));
        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(0.001);

        let err = runner.run(params("test/model", &sample, &schema, &tracker)).await.unwrap_err();
        assert!(err.is_budget_exceeded());
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_uses_fallback_estimate() {
        let (_, runner) = runner(ScriptedInvoker::new(vec![reply(r#"{"a": 1}"#)]));
        assert_eq!(runner.estimated_call_cost("nobody/unknown"), UNKNOWN_MODEL_CALL_COST);

        let sample = Sample::new("img", json!({"a": 1}));
        let schema = json!({});
        let tracker = BudgetTracker::new(1.0);
        let result = runner
            .run(params("nobody/unknown", &sample, &schema, &tracker))
            .await
            .unwrap();
        assert_eq!(result.actual_cost, 0.0);
        assert_eq!(tracker.live_reservations(), 0);
    }

    #[test]
    fn test_score_output_relaxed() {
        let score = score_output(
            &json!({"total": "8.00"}),
            &json!({"total": 8}),
            true,
            ComparisonMode::Relaxed,
        );
        assert_eq!(score.field_accuracy, 100);
        assert!(score.field_errors.is_empty());
        // exact match stays strict
        assert!(!score.exact_match);
    }
}
