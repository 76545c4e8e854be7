//! Runtime configuration.
//!
//! [`Config`] comes from environment variables with built-in defaults.
//! [`BenchmarkPlan`] is the YAML file describing what to benchmark.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::benchmark::{BackoffOptions, BenchmarkJob, ExecutorConfig, Sample};
use crate::budget::{BudgetTracker, ModelCandidate, ModelCatalog};
use crate::planning::{
    builtin_presets, optimize_runs_for_budget, recommend_models, Priority, RecommendConfig,
    Strategy, StrategyPreset,
};
use crate::scoring::ComparisonMode;

/// Budget available to model selection and run optimization, in USD.
pub const API_BUDGET_CEILING: f64 = 7.0;
/// Reservations beyond this are refused.
pub const SOFT_CEILING: f64 = 6.5;
/// Confirmed spend at this level stops the benchmark.
pub const HARD_CEILING: f64 = 15.0;
pub const PER_MODEL_CONCURRENCY: usize = 3;
pub const GLOBAL_CONCURRENCY: usize = 10;
pub const MIN_SAMPLE_COUNT: usize = 1;
pub const MAX_SAMPLE_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{name} must be positive, got {value}")]
    NonPositiveCeiling { name: &'static str, value: f64 },

    #[error("Soft ceiling {soft} exceeds hard ceiling {hard}")]
    CeilingOrder { soft: f64, hard: f64 },

    #[error("{0} must be at least 1")]
    ZeroConcurrency(&'static str),

    #[error("Plan needs between {MIN_SAMPLE_COUNT} and {MAX_SAMPLE_COUNT} samples, got {0}")]
    SampleCount(usize),

    #[error("Plan prompt is empty")]
    EmptyPrompt,

    #[error("Plan lists no models")]
    NoModels,

    #[error("No models fit the plan: {0}")]
    NoRecommendation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Required unless the mock invoker is used
    pub openrouter_api_key: Option<String>,
    pub soft_ceiling: f64,
    pub hard_ceiling: f64,
    /// Budget the planner fits runs into
    pub api_budget: f64,
    pub per_model_concurrency: usize,
    pub global_concurrency: usize,
    pub call_timeout: Option<Duration>,
    /// Use the deterministic mock instead of OpenRouter
    pub mock_openrouter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            soft_ceiling: SOFT_CEILING,
            hard_ceiling: HARD_CEILING,
            api_budget: API_BUDGET_CEILING,
            per_model_concurrency: PER_MODEL_CONCURRENCY,
            global_concurrency: GLOBAL_CONCURRENCY,
            call_timeout: None,
            mock_openrouter: false,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> ConfigResult<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

impl Config {
    /// Load settings from the environment.
    ///
    /// Variables:
    /// - `OPENROUTER_API_KEY`
    /// - `BENCH_SOFT_CEILING`, `BENCH_HARD_CEILING`, `BENCH_API_BUDGET` (USD)
    /// - `BENCH_PER_MODEL_CONCURRENCY`, `BENCH_GLOBAL_CONCURRENCY`
    /// - `BENCH_CALL_TIMEOUT_SECS`
    /// - `BENCH_MOCK_OPENROUTER` (`true` or `1`)
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let defaults = Self::default();
        let mock = lookup("BENCH_MOCK_OPENROUTER")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false);

        let config = Self {
            openrouter_api_key: lookup("OPENROUTER_API_KEY").filter(|k| !k.trim().is_empty()),
            soft_ceiling: parse_var(&lookup, "BENCH_SOFT_CEILING")?
                .unwrap_or(defaults.soft_ceiling),
            hard_ceiling: parse_var(&lookup, "BENCH_HARD_CEILING")?
                .unwrap_or(defaults.hard_ceiling),
            api_budget: parse_var(&lookup, "BENCH_API_BUDGET")?.unwrap_or(defaults.api_budget),
            per_model_concurrency: parse_var(&lookup, "BENCH_PER_MODEL_CONCURRENCY")?
                .unwrap_or(defaults.per_model_concurrency),
            global_concurrency: parse_var(&lookup, "BENCH_GLOBAL_CONCURRENCY")?
                .unwrap_or(defaults.global_concurrency),
            call_timeout: parse_var::<f64>(&lookup, "BENCH_CALL_TIMEOUT_SECS")?
                .map(|secs| {
                    if secs.is_finite() && secs > 0.0 {
                        Ok(Duration::from_secs_f64(secs))
                    } else {
                        Err(ConfigError::InvalidValue {
                            name: "BENCH_CALL_TIMEOUT_SECS",
                            value: secs.to_string(),
                        })
                    }
                })
                .transpose()?,
            mock_openrouter: mock,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, value) in [
            ("soft ceiling", self.soft_ceiling),
            ("hard ceiling", self.hard_ceiling),
            ("API budget", self.api_budget),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositiveCeiling { name, value });
            }
        }
        if self.soft_ceiling > self.hard_ceiling {
            return Err(ConfigError::CeilingOrder {
                soft: self.soft_ceiling,
                hard: self.hard_ceiling,
            });
        }
        if self.per_model_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency("per-model concurrency"));
        }
        if self.global_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency("global concurrency"));
        }
        Ok(())
    }

    pub fn budget_tracker(&self) -> BudgetTracker {
        BudgetTracker::with_hard_ceiling(self.soft_ceiling, self.hard_ceiling)
    }

    pub fn executor_config(&self, comparison_mode: ComparisonMode) -> ExecutorConfig {
        ExecutorConfig {
            per_model_concurrency: self.per_model_concurrency,
            global_concurrency: self.global_concurrency,
            comparison_mode,
            backoff: BackoffOptions::default(),
            call_timeout: self.call_timeout,
        }
    }
}

fn default_priorities() -> Vec<Priority> {
    Priority::DEFAULT_ORDER.to_vec()
}

/// A benchmark described in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkPlan {
    pub prompt: String,
    /// JSON schema the model output should follow
    pub schema: Value,
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub comparison_mode: ComparisonMode,
    /// Highest priority first
    #[serde(default = "default_priorities")]
    pub priorities: Vec<Priority>,
    #[serde(default)]
    pub strategy: Strategy,
    /// Explicit model ids; recommended from the strategy when absent
    #[serde(default)]
    pub models: Option<Vec<String>>,
    /// Only used with an explicit model list
    #[serde(default)]
    pub runs_per_model: Option<u32>,
    #[serde(default)]
    pub catalog: Option<ModelCatalog>,
    #[serde(default)]
    pub presets: Option<Vec<StrategyPreset>>,
}

impl BenchmarkPlan {
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let plan: Self = serde_yaml::from_str(text).context("Failed to parse benchmark plan")?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read benchmark plan {}", path.display()))?;
        let plan = Self::from_yaml(&text)
            .with_context(|| format!("Invalid benchmark plan {}", path.display()))?;
        tracing::info!(
            "Loaded plan from {} ({} samples, strategy {})",
            path.display(),
            plan.samples.len(),
            plan.strategy.as_str()
        );
        Ok(plan)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::EmptyPrompt);
        }
        if !(MIN_SAMPLE_COUNT..=MAX_SAMPLE_COUNT).contains(&self.samples.len()) {
            return Err(ConfigError::SampleCount(self.samples.len()));
        }
        if matches!(&self.models, Some(models) if models.is_empty()) {
            return Err(ConfigError::NoModels);
        }
        Ok(())
    }

    /// The plan's catalog override, or the built-in catalog.
    pub fn catalog(&self) -> ModelCatalog {
        self.catalog.clone().unwrap_or_else(ModelCatalog::builtin)
    }

    pub fn presets(&self) -> Vec<StrategyPreset> {
        self.presets.clone().unwrap_or_else(builtin_presets)
    }

    pub fn ground_truths(&self) -> Vec<Value> {
        self.samples.iter().map(|s| s.ground_truth.clone()).collect()
    }

    /// Turn the plan into a runnable job within `budget`.
    ///
    /// An explicit model list runs as given, with `runs_per_model` or the run
    /// count optimized for the budget. Otherwise models are recommended from
    /// the strategy and priorities.
    pub fn to_job(&self, catalog: &ModelCatalog, budget: f64) -> ConfigResult<PlannedJob> {
        let sample_count = self.samples.len() as u32;
        let (models, runs_per_model, reasoning) = match &self.models {
            Some(ids) if ids.is_empty() => return Err(ConfigError::NoModels),
            Some(ids) => {
                let known: Vec<ModelCandidate> =
                    ids.iter().filter_map(|id| catalog.get(id)).cloned().collect();
                let runs = self
                    .runs_per_model
                    .unwrap_or_else(|| optimize_runs_for_budget(&known, sample_count, budget));
                (ids.clone(), runs, None)
            }
            None => {
                let presets = self.presets();
                let set = recommend_models(RecommendConfig {
                    priorities: &self.priorities,
                    strategy: self.strategy,
                    catalog,
                    presets: &presets,
                    sample_count,
                    budget_ceiling: budget,
                });
                if set.models.is_empty() {
                    return Err(ConfigError::NoRecommendation(set.reasoning));
                }
                (set.model_ids(), set.runs_per_model, Some(set.reasoning))
            }
        };

        Ok(PlannedJob {
            job: BenchmarkJob {
                models,
                samples: self.samples.clone(),
                runs_per_model: runs_per_model.max(1),
                prompt: self.prompt.clone(),
                schema: self.schema.clone(),
            },
            reasoning,
        })
    }
}

/// A job ready for the executor.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub job: BenchmarkJob,
    /// Why these models were picked, when they were recommended
    pub reasoning: Option<String>,
}
