//! Errors returned by model invokers.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::benchmark::RateLimitSignal;

/// Coarse classification of an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeErrorKind {
    RateLimited,
    ServerError,
    ClientError,
}

impl fmt::Display for InvokeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
        };
        write!(f, "{}", s)
    }
}

/// Classify an HTTP status code.
pub fn classify_http_status(status: u16) -> InvokeErrorKind {
    match status {
        429 => InvokeErrorKind::RateLimited,
        500..=599 => InvokeErrorKind::ServerError,
        _ => InvokeErrorKind::ClientError,
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    /// HTTP 429. `retry_after` is the server's wait hint, if any.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Any other transport or provider failure. Never retried.
    #[error("{0}")]
    Failure(String),
}

impl InvokeError {
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}

impl RateLimitSignal for InvokeError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            Self::Failure(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_status() {
        assert_eq!(classify_http_status(429), InvokeErrorKind::RateLimited);
        assert_eq!(classify_http_status(503), InvokeErrorKind::ServerError);
        assert_eq!(classify_http_status(400), InvokeErrorKind::ClientError);
    }

    #[test]
    fn test_rate_limit_signal() {
        let err = InvokeError::rate_limited("slow down", Some(Duration::from_secs(2)));
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));

        let err = InvokeError::failure("boom");
        assert!(!err.is_rate_limited());
        assert_eq!(err.to_string(), "boom");
    }
}
