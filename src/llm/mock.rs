//! Deterministic mock invoker for development and tests.
//!
//! Every (model, image) pair gets its own seeded generator, so repeated runs
//! produce identical data without touching the network.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{InvokeError, InvokeRequest, Invocation, ModelInvoker};
use crate::budget::{ModelCatalog, PricingTier};

const LCG_MULTIPLIER: u64 = 1_664_525;
const LCG_INCREMENT: u64 = 1_013_904_223;
const LCG_MASK: u64 = 0x7fff_ffff;

/// Hash a string into a non-negative seed (31-based rolling hash over UTF-16 units).
pub fn hash_seed(input: &str) -> u64 {
    let mut hash: i32 = 0;
    for unit in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(unit as i32);
    }
    (hash as i64).unsigned_abs()
}

/// Linear-congruential generator yielding values in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn from_key(key: &str) -> Self {
        Self::new(hash_seed(key))
    }

    pub fn next_f64(&mut self) -> f64 {
        self.state =
            (self.state.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT)) & LCG_MASK;
        self.state as f64 / LCG_MASK as f64
    }
}

/// Probability that a leaf is reproduced correctly, by tier.
fn tier_quality(tier: Option<PricingTier>) -> f64 {
    match tier {
        Some(PricingTier::Free) => 0.5,
        Some(PricingTier::Budget) => 0.65,
        Some(PricingTier::Mid) => 0.8,
        Some(PricingTier::Premium) => 0.9,
        Some(PricingTier::Ultra) => 0.95,
        None => 0.7,
    }
}

/// Mock model invoker with realistic, reproducible variation.
pub struct MockInvoker {
    catalog: ModelCatalog,
    ground_truth: HashMap<String, Value>,
    simulate_delay: bool,
}

impl MockInvoker {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self {
            catalog,
            ground_truth: HashMap::new(),
            simulate_delay: true,
        }
    }

    /// Skip the simulated network delay.
    pub fn without_delay(mut self) -> Self {
        self.simulate_delay = false;
        self
    }

    /// Register the expected output for an image so mock answers resemble it.
    pub fn with_ground_truth(mut self, image_ref: impl Into<String>, expected: Value) -> Self {
        self.ground_truth.insert(image_ref.into(), expected);
        self
    }

    fn schema_shaped_output(schema: &Value, rng: &mut SeededRng) -> Value {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            let mut output = Map::new();
            output.insert("result".to_string(), Value::from("mock_data"));
            output.insert("confidence".to_string(), Value::from(rng.next_f64()));
            return Value::Object(output);
        };

        let mut output = Map::new();
        for (key, prop) in properties {
            let value = match prop.get("type").and_then(Value::as_str) {
                Some("string") => Value::from(format!("mock_{}_value", key)),
                Some("number") | Some("integer") => {
                    Value::from((rng.next_f64() * 1000.0).round() / 10.0)
                }
                Some("boolean") => Value::Bool(rng.next_f64() > 0.5),
                Some("array") => Value::Array(Vec::new()),
                Some("object") => Value::Object(Map::new()),
                _ => Value::Null,
            };
            output.insert(key.clone(), value);
        }
        Value::Object(output)
    }

    /// Copy `expected`, corrupting each leaf with probability `1 - quality`.
    fn degrade(expected: &Value, quality: f64, rng: &mut SeededRng) -> Value {
        match expected {
            Value::Array(items) => Value::Array(
                items.iter().map(|v| Self::degrade(v, quality, rng)).collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::degrade(v, quality, rng)))
                    .collect(),
            ),
            leaf => {
                if rng.next_f64() <= quality {
                    return leaf.clone();
                }
                match leaf {
                    Value::Bool(b) => Value::Bool(!b),
                    Value::Number(n) => Value::from(n.as_f64().unwrap_or(0.0) + 1.0),
                    Value::String(s) => Value::from(format!("{}?", s)),
                    _ => Value::from("unknown"),
                }
            }
        }
    }
}

#[async_trait]
impl ModelInvoker for MockInvoker {
    async fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
        let mut rng = SeededRng::from_key(&format!("{}{}", request.model_id, request.image_ref));

        let delay_ms = 500.0 + rng.next_f64() * 1500.0;
        if self.simulate_delay {
            tokio::time::sleep(Duration::from_secs_f64(delay_ms / 1000.0)).await;
        }

        if rng.next_f64() < 0.1 {
            return Err(InvokeError::failure(
                "Mock API error: model temporarily unavailable",
            ));
        }

        let latency_ms = 200.0 + rng.next_f64() * 4800.0;
        let input_tokens = 800 + (rng.next_f64() * 1200.0).floor() as u64;
        let output_tokens = 100 + (rng.next_f64() * 800.0).floor() as u64;

        let raw_text = if rng.next_f64() < 0.05 {
            "Sorry, I could not read the image.".to_string()
        } else {
            let tier = self.catalog.get(&request.model_id).map(|m| m.tier);
            let output = match self.ground_truth.get(&request.image_ref) {
                Some(expected) => Self::degrade(expected, tier_quality(tier), &mut rng),
                None => Self::schema_shaped_output(&request.schema, &mut rng),
            };
            output.to_string()
        };

        Ok(Invocation {
            raw_text,
            input_tokens,
            output_tokens,
            latency_ms,
        })
    }
}
