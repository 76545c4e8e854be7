//! Per-model statistics over run results.

use std::collections::HashMap;

use super::recommendation::{generate_rationale, select_recommended};
use super::{FieldErrorSummary, ModelSummary, ReportData};
use crate::benchmark::{BenchmarkOutcome, RunResult};
use crate::budget::ModelCatalog;
use crate::planning::estimator::round_to;
use crate::planning::Priority;

/// Group runs by model id, keeping the order in which models first appear.
pub fn group_by_model(results: &[RunResult]) -> Vec<(&str, Vec<&RunResult>)> {
    let mut groups: Vec<(&str, Vec<&RunResult>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for result in results {
        let slot = *index.entry(result.model_id.as_str()).or_insert_with(|| {
            groups.push((result.model_id.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(result);
    }
    groups
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `mean`.
fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn summarize(model_id: &str, runs: &[&RunResult], catalog: &ModelCatalog) -> ModelSummary {
    let info = catalog.get(model_id);
    let mut summary = ModelSummary {
        model_id: model_id.to_string(),
        model_name: info.map(|m| m.name.clone()).unwrap_or_else(|| model_id.to_string()),
        provider: info.map(|m| m.provider.clone()).unwrap_or_else(|| "unknown".to_string()),
        tier: info
            .map(|m| m.tier.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        accuracy: 0.0,
        exact_match_rate: 0.0,
        cost_per_run: 0.0,
        median_latency: 0.0,
        p95_latency: 0.0,
        spread: 0.0,
        runs_completed: 0,
        runs_attempted: runs.len(),
    };

    let completed: Vec<&RunResult> = runs.iter().copied().filter(|r| r.is_complete()).collect();
    if completed.is_empty() {
        return summary;
    }

    let accuracies: Vec<f64> = completed.iter().map(|r| r.field_accuracy()).collect();
    let accuracy = mean(&accuracies);
    let exact = completed.iter().filter(|r| r.exact_match()).count();
    let costs: Vec<f64> = completed.iter().map(|r| r.actual_cost).collect();

    let mut latencies: Vec<f64> = completed
        .iter()
        .map(|r| r.response_time_ms)
        .filter(|l| *l > 0.0)
        .collect();
    latencies.sort_by(|a, b| a.total_cmp(b));
    let (median, p95) = if latencies.is_empty() {
        (0.0, 0.0)
    } else {
        let n = latencies.len();
        let p95_index = ((n as f64 * 0.95).ceil() as usize).saturating_sub(1).min(n - 1);
        (latencies[n / 2], latencies[p95_index])
    };

    summary.accuracy = round_to(accuracy, 2);
    summary.exact_match_rate = round_to(exact as f64 / completed.len() as f64 * 100.0, 2);
    summary.cost_per_run = round_to(mean(&costs), 6);
    summary.median_latency = median.round();
    summary.p95_latency = p95.round();
    summary.spread = round_to(population_std_dev(&accuracies, accuracy), 2);
    summary.runs_completed = completed.len();
    summary
}

/// One summary per model, accuracy descending.
///
/// Models with no completed run are kept with zeroed statistics.
pub fn aggregate(results: &[RunResult], catalog: &ModelCatalog) -> Vec<ModelSummary> {
    let mut models: Vec<ModelSummary> = group_by_model(results)
        .into_iter()
        .map(|(model_id, runs)| summarize(model_id, &runs, catalog))
        .collect();
    models.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));
    models
}

/// Distinct (field, expected, actual) errors across one model's completed runs,
/// most frequent first.
pub fn model_field_errors<'a>(
    runs: impl IntoIterator<Item = &'a RunResult>,
) -> Vec<FieldErrorSummary> {
    let completed: Vec<&RunResult> = runs.into_iter().filter(|r| r.is_complete()).collect();
    if completed.is_empty() {
        return Vec::new();
    }

    let mut summaries: Vec<FieldErrorSummary> = Vec::new();
    let mut index: HashMap<(&str, &str, &str), usize> = HashMap::new();
    for run in &completed {
        for diff in run.field_errors() {
            if diff.field_path.is_empty() {
                continue;
            }
            let key = (diff.field_path.as_str(), diff.expected.as_str(), diff.actual.as_str());
            match index.get(&key) {
                Some(&i) => summaries[i].occurrences += 1,
                None => {
                    index.insert(key, summaries.len());
                    summaries.push(FieldErrorSummary {
                        field_path: diff.field_path.clone(),
                        expected: diff.expected.clone(),
                        actual: diff.actual.clone(),
                        occurrences: 1,
                        percentage: 0.0,
                    });
                }
            }
        }
    }

    let total = completed.len() as f64;
    for summary in &mut summaries {
        summary.percentage = round_to(summary.occurrences as f64 / total * 100.0, 2);
    }
    summaries.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    summaries
}

/// Assemble the report for a finished benchmark.
pub fn build_report(
    outcome: &BenchmarkOutcome,
    catalog: &ModelCatalog,
    priorities: &[Priority],
    image_count: usize,
) -> ReportData {
    let models = aggregate(&outcome.results, catalog);
    let recommended = select_recommended(&models, priorities);
    let rationale = recommended
        .map(|m| generate_rationale(m, &models, priorities))
        .unwrap_or_default();

    ReportData {
        recommended_model_id: recommended.map(|m| m.model_id.clone()),
        total_api_cost: outcome.budget.spent,
        rationale,
        priorities: priorities.to_vec(),
        image_count,
        model_count: models.len(),
        started_at: Some(outcome.started_at),
        completed_at: Some(outcome.completed_at),
        models,
    }
}
