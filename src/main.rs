//! `vlm-bench <plan.yaml>`: run a benchmark plan and print the report as JSON.

use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vlm_bench::benchmark::{BenchmarkExecutor, SkippedRun};
use vlm_bench::budget::BudgetSummary;
use vlm_bench::config::{BenchmarkPlan, Config};
use vlm_bench::llm::{MockInvoker, ModelInvoker, OpenRouterInvoker};
use vlm_bench::report::{aggregate_error_patterns, build_report, ErrorPattern, ReportData};
use vlm_bench::schema::{check_schema_compatibility, check_schema_for_union_types};

#[derive(Serialize)]
struct CliOutput {
    report: ReportData,
    error_patterns: Vec<ErrorPattern>,
    skipped: Vec<SkippedRun>,
    budget: BudgetSummary,
    aborted: bool,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vlm_bench=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_invoker(config: &Config, plan: &BenchmarkPlan) -> anyhow::Result<Arc<dyn ModelInvoker>> {
    if config.mock_openrouter {
        info!("Using mock invoker");
        let invoker = plan
            .samples
            .iter()
            .fold(MockInvoker::new(plan.catalog()), |mock, sample| {
                mock.with_ground_truth(sample.image_ref.clone(), sample.ground_truth.clone())
            });
        return Ok(Arc::new(invoker));
    }

    let api_key = config
        .openrouter_api_key
        .clone()
        .context("OPENROUTER_API_KEY is not set (set BENCH_MOCK_OPENROUTER=1 to use the mock)")?;
    Ok(Arc::new(OpenRouterInvoker::new(api_key)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("Usage: vlm-bench <plan.yaml>")?;

    let config = Config::from_env().context("Invalid configuration")?;
    let plan = BenchmarkPlan::load(&path)?;

    let compatibility = check_schema_compatibility(&plan.ground_truths());
    let union_warnings = check_schema_for_union_types(&plan.schema);
    for warning in compatibility.warnings.iter().chain(&union_warnings) {
        warn!("{}", warning);
    }

    let catalog = Arc::new(plan.catalog());
    let planned = plan.to_job(&catalog, config.api_budget)?;
    if let Some(reasoning) = &planned.reasoning {
        info!("{}", reasoning);
    }
    let model_count = planned.job.models.len();
    info!(
        "Benchmarking {} models x {} samples x {} runs",
        model_count,
        planned.job.samples.len(),
        planned.job.runs_per_model
    );

    let invoker = build_invoker(&config, &plan)?;
    let executor = BenchmarkExecutor::new(
        invoker,
        catalog.clone(),
        config.executor_config(plan.comparison_mode),
    );

    let cancel = executor.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting in-flight calls finish");
            cancel.cancel();
        }
    });

    let tracker = Arc::new(config.budget_tracker());
    let outcome = executor.execute(planned.job, tracker).await?;

    let report = build_report(&outcome, &catalog, &plan.priorities, plan.samples.len());
    let error_patterns = aggregate_error_patterns(&report.models, &outcome.results);
    info!(
        "Finished: {} runs, {} skipped, ${:.4} spent",
        outcome.results.len(),
        outcome.skipped.len(),
        outcome.budget.spent
    );

    let output = CliOutput {
        report,
        error_patterns,
        skipped: outcome.skipped,
        budget: outcome.budget,
        aborted: outcome.aborted,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
