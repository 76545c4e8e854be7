//! Model recommendation: pick a model subset and run count that fit the budget.

use serde::{Deserialize, Serialize};

use super::estimator::{estimate_cost, CostEstimateInput};
use super::presets::{find_preset, Priority, Strategy, StrategyPreset};
use crate::budget::{ModelCandidate, ModelCatalog, PricingTier};

/// Weight of the first, second and third priority. Later ones weigh 1.
const PRIORITY_WEIGHTS: [u32; 3] = [3, 2, 1];

#[derive(Debug, Clone, Copy)]
pub struct RecommendConfig<'a> {
    /// Highest priority first
    pub priorities: &'a [Priority],
    pub strategy: Strategy,
    pub catalog: &'a ModelCatalog,
    pub presets: &'a [StrategyPreset],
    pub sample_count: u32,
    pub budget_ceiling: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedModelSet {
    pub models: Vec<ModelCandidate>,
    pub runs_per_model: u32,
    pub reasoning: String,
}

impl RecommendedModelSet {
    fn empty(reasoning: &str) -> Self {
        Self {
            models: Vec::new(),
            runs_per_model: 1,
            reasoning: reasoning.to_string(),
        }
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.models.iter().map(|m| m.id.clone()).collect()
    }
}

fn tier_score(priority: Priority, tier: PricingTier) -> u32 {
    use PricingTier::*;
    match priority {
        Priority::Accuracy => match tier {
            Free => 1,
            Budget => 2,
            Mid => 4,
            Premium | Ultra => 5,
        },
        // Cheaper tiers tend to be both faster and cheaper.
        Priority::Speed | Priority::Cost => match tier {
            Free => 5,
            Budget => 4,
            Mid => 3,
            Premium => 2,
            Ultra => 1,
        },
    }
}

/// Weighted fit of a model to the ranked priorities.
pub fn score_model(model: &ModelCandidate, priorities: &[Priority]) -> u32 {
    priorities
        .iter()
        .enumerate()
        .map(|(i, p)| PRIORITY_WEIGHTS.get(i).copied().unwrap_or(1) * tier_score(*p, model.tier))
        .sum()
}

fn fits(models: &[ModelCandidate], runs_per_model: u32, config: &RecommendConfig<'_>) -> bool {
    let estimate = estimate_cost(CostEstimateInput {
        models,
        runs_per_model,
        sample_count: config.sample_count,
        budget_ceiling: config.budget_ceiling,
    });
    estimate.estimated_cost <= config.budget_ceiling
}

pub fn recommend_models(config: RecommendConfig<'_>) -> RecommendedModelSet {
    let Some(preset) = find_preset(config.presets, config.strategy) else {
        return RecommendedModelSet::empty("Unknown strategy selected.");
    };

    let eligible: Vec<&ModelCandidate> = config
        .catalog
        .models()
        .iter()
        .filter(|m| preset.allows(m.tier))
        .collect();
    if eligible.is_empty() {
        return RecommendedModelSet::empty("No models available for the selected strategy.");
    }

    let mut scored: Vec<(u32, &ModelCandidate)> = eligible
        .iter()
        .map(|m| (score_model(m, config.priorities), *m))
        .collect();
    // Stable: equal scores keep catalog order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let target = (eligible.len() as u32)
        .max(preset.model_count.min)
        .min(preset.model_count.max) as usize;
    let selected: Vec<ModelCandidate> = scored
        .into_iter()
        .take(target)
        .map(|(_, m)| m.clone())
        .collect();

    let min_runs = preset.runs_per_model.min;
    let mut runs_per_model = preset.runs_per_model.max;
    while runs_per_model > min_runs && !fits(&selected, runs_per_model, &config) {
        runs_per_model -= 1;
    }

    let models = if fits(&selected, runs_per_model, &config) {
        selected
    } else {
        // Still over budget at the minimum: re-add by input price, keep what fits.
        let mut by_cost = selected;
        by_cost.sort_by(|a, b| a.input_cost_per_1m.total_cmp(&b.input_cost_per_1m));
        let mut kept: Vec<ModelCandidate> = Vec::new();
        for model in by_cost {
            kept.push(model);
            if !fits(&kept, runs_per_model, &config) {
                kept.pop();
            }
        }
        tracing::debug!(
            "Trimmed recommendation to {} models to fit ${:.2} at {} runs",
            kept.len(),
            config.budget_ceiling,
            runs_per_model
        );
        kept
    };

    let primary = config.priorities.first().copied().unwrap_or(Priority::Accuracy);
    let reasoning = format!(
        "{} models selected for {}, prioritizing {}. Runs per model automatically optimized to maximize testing within your plan.",
        models.len(),
        config.strategy.coverage_label(),
        primary
    );

    RecommendedModelSet {
        models,
        runs_per_model,
        reasoning,
    }
}
