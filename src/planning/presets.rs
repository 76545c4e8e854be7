//! Strategy presets: breadth (many models) versus depth (many runs per model).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::budget::PricingTier;

/// What the user cares about, ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Accuracy,
    Speed,
    Cost,
}

impl Priority {
    /// Default ranking.
    pub const DEFAULT_ORDER: [Priority; 3] = [Priority::Accuracy, Priority::Speed, Priority::Cost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Speed => "speed",
            Self::Cost => "cost",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    QuickSurvey,
    #[default]
    Balanced,
    DeepDive,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickSurvey => "quick-survey",
            Self::Balanced => "balanced",
            Self::DeepDive => "deep-dive",
        }
    }

    /// Short label used in recommendation reasoning.
    pub fn coverage_label(&self) -> &'static str {
        match self {
            Self::QuickSurvey => "broad coverage",
            Self::Balanced => "balanced coverage",
            Self::DeepDive => "deep analysis",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive `min..=max` bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPreset {
    pub id: Strategy,
    pub name: String,
    pub description: String,
    /// Tiers eligible under this strategy
    pub tiers: Vec<PricingTier>,
    pub model_count: CountRange,
    pub runs_per_model: CountRange,
    #[serde(default)]
    pub recommended: bool,
    pub rationale: String,
}

impl StrategyPreset {
    pub fn allows(&self, tier: PricingTier) -> bool {
        self.tiers.contains(&tier)
    }
}

/// The three built-in presets.
pub fn builtin_presets() -> Vec<StrategyPreset> {
    use PricingTier::*;
    vec![
        StrategyPreset {
            id: Strategy::QuickSurvey,
            name: "Quick Survey".to_string(),
            description: "Test many models with fewer runs each. Great for narrowing down candidates.".to_string(),
            tiers: vec![Free, Budget, Mid, Premium, Ultra],
            model_count: CountRange::new(18, 20),
            runs_per_model: CountRange::new(2, 3),
            recommended: false,
            rationale: "Broad coverage across all tiers. Lower statistical confidence per model but identifies the top contenders quickly.".to_string(),
        },
        StrategyPreset {
            id: Strategy::Balanced,
            name: "Balanced".to_string(),
            description: "Moderate number of models with solid statistical confidence.".to_string(),
            tiers: vec![Budget, Mid, Premium],
            model_count: CountRange::new(12, 15),
            runs_per_model: CountRange::new(3, 5),
            recommended: true,
            rationale: "Best tradeoff between coverage and confidence. Tests enough models to find the best while running enough times to trust the results.".to_string(),
        },
        StrategyPreset {
            id: Strategy::DeepDive,
            name: "Deep Dive".to_string(),
            description: "Fewer models but more runs each. Best for final selection with high confidence.".to_string(),
            tiers: vec![Mid, Premium],
            model_count: CountRange::new(6, 8),
            runs_per_model: CountRange::new(5, 8),
            recommended: false,
            rationale: "Maximum statistical confidence on a focused set. Ideal when you already know which tier you want and need reliable accuracy numbers.".to_string(),
        },
    ]
}

pub fn find_preset(presets: &[StrategyPreset], strategy: Strategy) -> Option<&StrategyPreset> {
    presets.iter().find(|p| p.id == strategy)
}
