//! Recommended model and human-readable rationale.

use std::cmp::Ordering;

use super::ModelSummary;
use crate::planning::Priority;

/// Savings versus the most expensive model worth mentioning, in percent.
const MIN_SAVINGS_PERCENT: f64 = 10.0;

/// Spread below which results are called consistent.
const CONSISTENT_SPREAD: f64 = 5.0;

/// Pick the model that best serves the top priority.
///
/// Only models with completed runs qualify. Accuracy wants the highest
/// accuracy, speed the lowest median latency, cost the lowest cost per run;
/// speed and cost ties go to the more accurate model. Remaining ties keep the
/// earlier model.
pub fn select_recommended<'a>(
    models: &'a [ModelSummary],
    priorities: &[Priority],
) -> Option<&'a ModelSummary> {
    let top = priorities.first().copied().unwrap_or(Priority::Accuracy);
    let by_accuracy = |a: &ModelSummary, b: &ModelSummary| b.accuracy.total_cmp(&a.accuracy);
    let rank = |a: &ModelSummary, b: &ModelSummary| -> Ordering {
        match top {
            Priority::Accuracy => by_accuracy(a, b),
            Priority::Speed => a
                .median_latency
                .total_cmp(&b.median_latency)
                .then_with(|| by_accuracy(a, b)),
            Priority::Cost => a
                .cost_per_run
                .total_cmp(&b.cost_per_run)
                .then_with(|| by_accuracy(a, b)),
        }
    };

    models
        .iter()
        .filter(|m| m.runs_completed > 0)
        .fold(None, |best: Option<&ModelSummary>, candidate| match best {
            Some(current) if rank(candidate, current) != Ordering::Less => Some(current),
            _ => Some(candidate),
        })
}

/// Explain why `recommended` was picked.
///
/// Leads with the top priority's metric, then adds savings versus the most
/// expensive model (when above 10%) and a consistency note (spread below 5).
pub fn generate_rationale(
    recommended: &ModelSummary,
    all_models: &[ModelSummary],
    priorities: &[Priority],
) -> String {
    let name = &recommended.model_name;
    let mut parts = Vec::new();

    match priorities.first().copied().unwrap_or(Priority::Accuracy) {
        Priority::Accuracy => {
            parts.push(format!("{} achieved {}% field accuracy", name, recommended.accuracy))
        }
        Priority::Speed => {
            parts.push(format!("{} responded in {}ms median", name, recommended.median_latency))
        }
        Priority::Cost => {
            parts.push(format!("{} costs ${:.6}/call", name, recommended.cost_per_run))
        }
    }

    let priced: Vec<&ModelSummary> = all_models.iter().filter(|m| m.cost_per_run > 0.0).collect();
    if priced.len() > 1 {
        let most_expensive = priced
            .iter()
            .copied()
            .fold(priced[0], |max, m| if m.cost_per_run > max.cost_per_run { m } else { max });
        if most_expensive.model_id != recommended.model_id {
            let savings = (most_expensive.cost_per_run - recommended.cost_per_run)
                / most_expensive.cost_per_run
                * 100.0;
            if savings > MIN_SAVINGS_PERCENT {
                parts.push(format!(
                    "{}% cheaper than {}",
                    savings.round(),
                    most_expensive.model_name
                ));
            }
        }
    }

    if recommended.spread < CONSISTENT_SPREAD {
        parts.push(format!("with consistent results (\u{b1}{}%)", recommended.spread));
    }

    format!("{}.", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, accuracy: f64, latency: f64, cost: f64, spread: f64) -> ModelSummary {
        ModelSummary {
            model_id: id.to_string(),
            model_name: id.to_uppercase(),
            provider: "test".to_string(),
            tier: "mid".to_string(),
            accuracy,
            exact_match_rate: 0.0,
            cost_per_run: cost,
            median_latency: latency,
            p95_latency: latency,
            spread,
            runs_completed: 3,
            runs_attempted: 3,
        }
    }

    fn models() -> Vec<ModelSummary> {
        vec![
            summary("best", 95.5, 2000.0, 0.01, 2.0),
            summary("fast", 80.0, 400.0, 0.004, 8.0),
            summary("cheap", 70.0, 900.0, 0.001, 3.0),
            summary("cheap-better", 75.0, 900.0, 0.001, 3.0),
        ]
    }

    #[test]
    fn test_select_by_priority() {
        let models = models();
        let pick = |p: Priority| select_recommended(&models, &[p]).map(|m| m.model_id.as_str());
        assert_eq!(pick(Priority::Accuracy), Some("best"));
        assert_eq!(pick(Priority::Speed), Some("fast"));
        // tie on cost goes to the more accurate model
        assert_eq!(pick(Priority::Cost), Some("cheap-better"));
        assert_eq!(select_recommended(&models, &[]).map(|m| m.model_id.as_str()), Some("best"));
    }

    #[test]
    fn test_select_skips_models_without_completed_runs() {
        let mut models = models();
        models[0].runs_completed = 0;
        let pick = select_recommended(&models, &[Priority::Accuracy]).unwrap();
        assert_eq!(pick.model_id, "fast");

        for m in &mut models {
            m.runs_completed = 0;
        }
        assert!(select_recommended(&models, &[Priority::Accuracy]).is_none());
    }

    #[test]
    fn test_rationale_accuracy() {
        let models = models();
        let text = generate_rationale(&models[0], &models, &Priority::DEFAULT_ORDER);
        assert_eq!(text, "BEST achieved 95.5% field accuracy, with consistent results (\u{b1}2%).");
    }

    #[test]
    fn test_rationale_cost_with_savings() {
        let models = models();
        let text = generate_rationale(&models[2], &models, &[Priority::Cost]);
        assert_eq!(
            text,
            "CHEAP costs $0.001000/call, 90% cheaper than BEST, with consistent results (\u{b1}3%)."
        );
    }

    #[test]
    fn test_rationale_speed_without_consistency() {
        let models = models();
        let text = generate_rationale(&models[1], &models, &[Priority::Speed]);
        assert_eq!(text, "FAST responded in 400ms median, 60% cheaper than BEST.");
    }

    #[test]
    fn test_rationale_small_savings_omitted() {
        let models = vec![
            summary("a", 90.0, 100.0, 0.0095, 9.0),
            summary("b", 80.0, 100.0, 0.01, 9.0),
        ];
        let text = generate_rationale(&models[0], &models, &[Priority::Accuracy]);
        assert_eq!(text, "A achieved 90% field accuracy.");
    }
}
