//! Error types returned by the middleware.

use std::time::Duration;

use thiserror::Error;

use crate::breaker::CircuitState;

/// Errors surfaced by [`crate::ResilienceMiddleware::execute`].
///
/// Admission rejections (`CircuitOpen`, `RateLimitExceeded`) are raised
/// before the operation runs and are never retried by the middleware itself.
/// Operation errors are carried intact in the `Operation` variant so callers
/// can pattern-match on the original error type.
#[derive(Debug, Error)]
pub enum MiddlewareError<E> {
    /// The circuit breaker rejected the call.
    #[error("circuit breaker is {}, will allow trial calls in {recovery_timeout:?}", .state.as_str())]
    CircuitOpen {
        /// Breaker state observed at rejection time.
        state: CircuitState,
        /// Configured recovery timeout.
        recovery_timeout: Duration,
    },

    /// The rate limiter rejected the call.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Suggested wait until the window frees a slot.
        retry_after: Duration,
    },

    /// The wrapped operation failed after exhausting retries, or failed with
    /// a non-retryable error.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> MiddlewareError<E> {
    /// Returns true if the call was rejected by the circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, MiddlewareError::CircuitOpen { .. })
    }

    /// Returns true if the call was rejected by the rate limiter.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MiddlewareError::RateLimitExceeded { .. })
    }

    /// Returns the suggested wait time for a rate-limit rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MiddlewareError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Extracts the original operation error, if present.
    pub fn into_operation(self) -> Option<E> {
        match self {
            MiddlewareError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<E> for MiddlewareError<E> {
    fn from(err: E) -> Self {
        MiddlewareError::Operation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_discriminate_variants() {
        let err: MiddlewareError<&str> = MiddlewareError::CircuitOpen {
            state: CircuitState::Open,
            recovery_timeout: Duration::from_secs(30),
        };
        assert!(err.is_circuit_open());
        assert!(!err.is_rate_limited());
        assert_eq!(err.into_operation(), None);

        let err: MiddlewareError<&str> = MiddlewareError::RateLimitExceeded {
            retry_after: Duration::from_secs(2),
        };
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));

        let err: MiddlewareError<&str> = MiddlewareError::Operation("boom");
        assert_eq!(err.into_operation(), Some("boom"));
    }

    #[test]
    fn display_includes_breaker_state() {
        let err: MiddlewareError<&str> = MiddlewareError::CircuitOpen {
            state: CircuitState::Open,
            recovery_timeout: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("open"));
    }
}
