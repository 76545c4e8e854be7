//! Exponential backoff with jitter for rate-limited calls.
//!
//! On a rate-limit failure:
//! - If the server sent a wait hint, wait exactly that long
//! - Otherwise wait `min(base * 2^attempt + uniform(0, 1000ms), max_delay)`
//! - Retry up to `max_retries` times
//!
//! Any other failure is returned immediately.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Upper bound of the random jitter added to exponential delays.
const MAX_JITTER_MS: f64 = 1000.0;

/// Implemented by errors that may signal a rate limit.
pub trait RateLimitSignal {
    /// Whether this failure is an HTTP 429 (or equivalent).
    fn is_rate_limited(&self) -> bool;

    /// Server-provided wait hint, if any.
    fn retry_after(&self) -> Option<Duration>;
}

/// Retry limits for [`with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffOptions {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffOptions {
    /// Delay before the retry following failed `attempt` (0-indexed).
    pub fn delay_for(
        &self,
        attempt: u32,
        retry_after: Option<Duration>,
        jitter_ms: f64,
    ) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }
        let exponential = self.base_delay_ms as f64 * 2f64.powi(attempt.min(62) as i32);
        let delay_ms = (exponential + jitter_ms).min(self.max_delay_ms as f64);
        Duration::from_micros((delay_ms * 1000.0).round() as u64)
    }
}

/// Run `operation`, retrying rate-limit failures with backoff.
pub async fn with_backoff<T, E, F, Fut>(operation: F, options: &BackoffOptions) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal + std::fmt::Display,
{
    with_backoff_rng(operation, options, &mut StdRng::from_entropy()).await
}

/// [`with_backoff`] with an explicit jitter source.
pub async fn with_backoff_rng<T, E, F, Fut, R>(
    mut operation: F,
    options: &BackoffOptions,
    rng: &mut R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal + std::fmt::Display,
    R: Rng,
{
    let mut attempt = 0;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_rate_limited() || attempt >= options.max_retries {
            if error.is_rate_limited() {
                tracing::error!("Rate limited after {} retries: {}", attempt, error);
            }
            return Err(error);
        }

        let jitter_ms = rng.gen_range(0.0..MAX_JITTER_MS);
        let delay = options.delay_for(attempt, error.retry_after(), jitter_ms);
        tracing::warn!(
            "Retry attempt {} rate limited, retrying in {:?}: {}",
            attempt + 1,
            delay,
            error
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
