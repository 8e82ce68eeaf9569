//! Jittered exponential backoff and retry decisions.
//!
//! The policy is stateless: a delay is a pure function of the attempt index
//! and the immutable configuration (plus jitter), and the retry decision
//! defers entirely to the injected [`ErrorClassifier`].

use std::time::Duration;

use rand::Rng;

use crate::classifier::{ErrorClassifier, RetryClass};
use crate::config::RetryConfig;

/// Computed delays never dip below this, even after negative jitter.
const MIN_DELAY_SECS: f64 = 0.1;

/// Retry policy with exponential backoff and uniform jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Computes the backoff delay for a zero-indexed retry attempt.
    ///
    /// `base_delay * exponential_base^attempt`, clamped at `max_delay`, then
    /// perturbed by uniform jitter in `±(delay * jitter)` and floored at
    /// 100ms. Jitter decorrelates concurrent callers so a shared upstream
    /// outage does not produce synchronized retry storms.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = (self.config.base_delay.as_secs_f64()
            * self.config.exponential_base.powi(attempt as i32))
        .min(self.config.max_delay.as_secs_f64());

        let jitter_range = capped * self.config.jitter;
        let jittered = if jitter_range > 0.0 {
            capped + rand::rng().random_range(-jitter_range..=jitter_range)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(MIN_DELAY_SECS))
    }

    /// Decides whether a failed attempt should be retried.
    ///
    /// Always false once `attempt` reaches `max_retries`; otherwise the
    /// classifier's verdict is authoritative, and anything other than an
    /// explicit [`RetryClass::Retryable`] means no retry.
    pub fn should_retry<Err>(
        &self,
        attempt: u32,
        error: &Err,
        classifier: &dyn ErrorClassifier<Err>,
    ) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }
        classifier.classify(error) == RetryClass::Retryable
    }
}
