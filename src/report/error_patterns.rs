//! Cross-model error patterns: which fields each model misses most.

use std::collections::HashMap;

use super::{ErrorPattern, ModelSummary};
use crate::benchmark::RunResult;
use crate::planning::estimator::round_to;

/// Patterns below this share of completed runs are one-off noise.
const MIN_PATTERN_PERCENTAGE: f64 = 10.0;

/// Value counts that remember first-seen order.
#[derive(Default)]
struct Tally<'a> {
    counts: Vec<(&'a str, usize)>,
}

impl<'a> Tally<'a> {
    fn add(&mut self, value: &'a str) {
        match self.counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((value, 1)),
        }
    }

    /// Most frequent value; the first seen wins ties.
    fn most_common(&self) -> &'a str {
        let mut best: Option<(&'a str, usize)> = None;
        for &(value, count) in &self.counts {
            if best.map_or(true, |(_, top)| count > top) {
                best = Some((value, count));
            }
        }
        best.map(|(value, _)| value).unwrap_or("")
    }
}

#[derive(Default)]
struct FieldStats<'a> {
    /// Runs with at least one error on this field
    occurrences: usize,
    expected: Tally<'a>,
    actual: Tally<'a>,
}

/// Error patterns for every summarized model, most frequent first.
///
/// A field counts once per run no matter how many diffs it produced; every
/// diff still feeds the expected/actual value frequencies.
pub fn aggregate_error_patterns(
    models: &[ModelSummary],
    results: &[RunResult],
) -> Vec<ErrorPattern> {
    let mut by_model: HashMap<&str, Vec<&RunResult>> = HashMap::new();
    for result in results {
        by_model.entry(result.model_id.as_str()).or_default().push(result);
    }

    let mut patterns = Vec::new();
    for model in models {
        let Some(runs) = by_model.get(model.model_id.as_str()) else {
            continue;
        };
        let completed: Vec<&RunResult> = runs.iter().copied().filter(|r| r.is_complete()).collect();
        let total_runs = completed.len();
        if total_runs == 0 {
            continue;
        }

        let mut fields: Vec<(&str, FieldStats<'_>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for run in &completed {
            let mut seen: Vec<&str> = Vec::new();
            for diff in run.field_errors() {
                let path = diff.field_path.as_str();
                if path.is_empty() {
                    continue;
                }
                let slot = *index.entry(path).or_insert_with(|| {
                    fields.push((path, FieldStats::default()));
                    fields.len() - 1
                });
                let stats = &mut fields[slot].1;
                if !seen.contains(&path) {
                    seen.push(path);
                    stats.occurrences += 1;
                }
                stats.expected.add(&diff.expected);
                stats.actual.add(&diff.actual);
            }
        }

        for (path, stats) in fields {
            let percentage = stats.occurrences as f64 / total_runs as f64 * 100.0;
            if percentage < MIN_PATTERN_PERCENTAGE {
                continue;
            }
            patterns.push(ErrorPattern {
                model_name: model.model_name.clone(),
                model_id: model.model_id.clone(),
                field_path: path.to_string(),
                occurrences: stats.occurrences,
                total_runs,
                percentage: round_to(percentage, 2),
                common_expected: stats.expected.most_common().to_string(),
                common_actual: stats.actual.most_common().to_string(),
            });
        }
    }

    patterns.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| b.percentage.total_cmp(&a.percentage))
    });
    patterns
}
