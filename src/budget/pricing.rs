//! Model catalog and pricing arithmetic.
//!
//! Prices are per million tokens in USD, as published by OpenRouter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Conservative input token estimate for one vision call (~1 image + prompt).
pub const ESTIMATED_INPUT_TOKENS: u64 = 1500;

/// Conservative output token estimate for one JSON response.
pub const ESTIMATED_OUTPUT_TOKENS: u64 = 500;

/// Date when the built-in catalog prices were last verified.
pub const PRICES_AS_OF_DATE: &str = "2026-02-11";

/// Pricing tier of a model, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    Free,
    Budget,
    Mid,
    Premium,
    Ultra,
}

impl PricingTier {
    pub const ALL: [PricingTier; 5] = [
        PricingTier::Free,
        PricingTier::Budget,
        PricingTier::Mid,
        PricingTier::Premium,
        PricingTier::Ultra,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Budget => "budget",
            Self::Mid => "mid",
            Self::Premium => "premium",
            Self::Ultra => "ultra",
        }
    }
}

impl fmt::Display for PricingTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model that can be benchmarked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    /// OpenRouter model ID (e.g. "openai/gpt-4o")
    pub id: String,
    /// Display name
    pub name: String,
    pub provider: String,
    pub tier: PricingTier,
    pub input_cost_per_1m: f64,
    pub output_cost_per_1m: f64,
}

impl ModelCandidate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        tier: PricingTier,
        input_cost_per_1m: f64,
        output_cost_per_1m: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider: provider.into(),
            tier,
            input_cost_per_1m,
            output_cost_per_1m,
        }
    }

    /// Cost in USD for the given token counts.
    pub fn cost_for(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_cost_per_1m
            + output_tokens as f64 * self.output_cost_per_1m)
            / 1_000_000.0
    }

    /// A-priori cost of one call using the conservative token estimates.
    pub fn estimated_call_cost(&self) -> f64 {
        self.cost_for(ESTIMATED_INPUT_TOKENS, ESTIMATED_OUTPUT_TOKENS)
    }
}

/// Read-only list of benchmarkable models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    models: Vec<ModelCandidate>,
}

impl ModelCatalog {
    pub fn new(models: Vec<ModelCandidate>) -> Self {
        Self { models }
    }

    /// Curated vision-capable models.
    pub fn builtin() -> Self {
        use PricingTier::*;
        #[rustfmt::skip]
        let models = vec![
            ModelCandidate::new("google/gemma-3-27b-it:free", "Gemma 3 27B (free)", "google", Free, 0.0, 0.0),
            ModelCandidate::new("meta-llama/llama-4-scout:free", "Llama 4 Scout (free)", "meta-llama", Free, 0.0, 0.0),
            ModelCandidate::new("google/gemini-2.0-flash-lite-001", "Gemini 2.0 Flash Lite", "google", Budget, 0.075, 0.3),
            ModelCandidate::new("openai/gpt-4.1-nano", "GPT-4.1 Nano", "openai", Budget, 0.1, 0.4),
            ModelCandidate::new("qwen/qwen2.5-vl-72b-instruct", "Qwen2.5 VL 72B", "qwen", Budget, 0.25, 0.75),
            ModelCandidate::new("google/gemini-2.5-flash", "Gemini 2.5 Flash", "google", Mid, 0.3, 2.5),
            ModelCandidate::new("openai/gpt-4.1-mini", "GPT-4.1 Mini", "openai", Mid, 0.4, 1.6),
            ModelCandidate::new("mistralai/mistral-medium-3", "Mistral Medium 3", "mistralai", Mid, 0.4, 2.0),
            ModelCandidate::new("anthropic/claude-3.5-haiku", "Claude 3.5 Haiku", "anthropic", Mid, 0.8, 4.0),
            ModelCandidate::new("openai/gpt-4o", "GPT-4o", "openai", Premium, 2.5, 10.0),
            ModelCandidate::new("google/gemini-2.5-pro", "Gemini 2.5 Pro", "google", Premium, 1.25, 10.0),
            ModelCandidate::new("anthropic/claude-sonnet-4", "Claude Sonnet 4", "anthropic", Premium, 3.0, 15.0),
            ModelCandidate::new("anthropic/claude-opus-4", "Claude Opus 4", "anthropic", Ultra, 15.0, 75.0),
            ModelCandidate::new("openai/o3", "o3", "openai", Ultra, 2.0, 8.0),
        ];
        Self::new(models)
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelCandidate> {
        self.models.iter().find(|m| m.id == model_id)
    }

    pub fn models(&self) -> &[ModelCandidate] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
