//! Configuration for the middleware and its components.
//!
//! The three component configs are plain immutable value objects with the
//! documented defaults. [`MiddlewareConfig`] composes them together with the
//! injected collaborators and event listeners, and is constructed through a
//! builder.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitState;
use crate::classifier::{
    ErrorClassifier, FnClassifier, NeverRetry, RetryClass, SharedErrorClassifier,
};
use crate::events::{EventListeners, FnListener, MiddlewareEvent, RejectionReason};
use crate::usage::{FnExtractor, NoUsage, SharedTokenExtractor, TokenExtractor};

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive-ish failures (successes decay the count) before opening.
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing recovery.
    pub recovery_timeout: Duration,
    /// Trial calls admitted while half-open.
    pub half_open_max_calls: u32,
    /// Successes required to close from half-open.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_calls: 3,
            success_threshold: 2,
        }
    }
}

/// Configuration for the rate limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Nominal steady-state request rate.
    pub requests_per_minute: u32,
    /// Nominal steady-state token rate.
    pub tokens_per_minute: u64,
    /// Multiplier permitting short-term excess over the nominal rates.
    pub burst_allowance: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            tokens_per_minute: 100_000,
            burst_allowance: 1.5,
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub exponential_base: f64,
    /// Uniform jitter fraction applied to each computed delay.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: 0.1,
        }
    }
}

/// Combined configuration for a [`crate::ResilienceMiddleware`] instance.
///
/// # Type Parameters
///
/// - `Res`: The success response type of the wrapped operation
/// - `Err`: The error type of the wrapped operation
pub struct MiddlewareConfig<Res, Err> {
    pub(crate) circuit_breaker: CircuitBreakerConfig,
    pub(crate) rate_limiter: RateLimiterConfig,
    pub(crate) retry: RetryConfig,
    pub(crate) enabled: bool,
    pub(crate) verbose: bool,
    pub(crate) name: String,
    pub(crate) classifier: SharedErrorClassifier<Err>,
    pub(crate) token_extractor: SharedTokenExtractor<Res>,
    pub(crate) event_listeners: EventListeners<MiddlewareEvent>,
}

impl<Res, Err> MiddlewareConfig<Res, Err> {
    /// Creates a new configuration builder.
    pub fn builder() -> MiddlewareConfigBuilder<Res, Err> {
        MiddlewareConfigBuilder::new()
    }
}

impl<Res, Err> Default for MiddlewareConfig<Res, Err> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<Res, Err> Clone for MiddlewareConfig<Res, Err> {
    fn clone(&self) -> Self {
        Self {
            circuit_breaker: self.circuit_breaker.clone(),
            rate_limiter: self.rate_limiter.clone(),
            retry: self.retry.clone(),
            enabled: self.enabled,
            verbose: self.verbose,
            name: self.name.clone(),
            classifier: Arc::clone(&self.classifier),
            token_extractor: Arc::clone(&self.token_extractor),
            event_listeners: self.event_listeners.clone(),
        }
    }
}

impl<Res, Err> std::fmt::Debug for MiddlewareConfig<Res, Err> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareConfig")
            .field("circuit_breaker", &self.circuit_breaker)
            .field("rate_limiter", &self.rate_limiter)
            .field("retry", &self.retry)
            .field("enabled", &self.enabled)
            .field("verbose", &self.verbose)
            .field("name", &self.name)
            .finish()
    }
}

/// Builder for [`MiddlewareConfig`].
pub struct MiddlewareConfigBuilder<Res, Err> {
    circuit_breaker: CircuitBreakerConfig,
    rate_limiter: RateLimiterConfig,
    retry: RetryConfig,
    enabled: bool,
    verbose: bool,
    name: String,
    classifier: SharedErrorClassifier<Err>,
    token_extractor: SharedTokenExtractor<Res>,
    event_listeners: EventListeners<MiddlewareEvent>,
}

impl<Res, Err> MiddlewareConfigBuilder<Res, Err> {
    /// Creates a new builder with default values.
    ///
    /// Defaults:
    /// - circuit breaker: threshold 5, recovery 30s, 3 half-open calls, 2 successes to close
    /// - rate limiter: 60 requests/min, 100k tokens/min, 1.5x burst
    /// - retry: 3 retries, 1s base, 60s cap, base 2.0, 10% jitter
    /// - enabled, not verbose
    /// - classifier: [`NeverRetry`] (nothing is retried until one is supplied)
    /// - token extractor: [`NoUsage`]
    pub fn new() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            enabled: true,
            verbose: false,
            name: "<unnamed>".to_string(),
            classifier: Arc::new(NeverRetry),
            token_extractor: Arc::new(NoUsage),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Sets the rate limiter configuration.
    pub fn rate_limiter(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limiter = config;
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Enables or disables the middleware entirely.
    ///
    /// When disabled, `execute` invokes the operation directly with no
    /// admission checks, retries, or accounting.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Promotes per-attempt progress logging from debug to info level.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Gives this middleware instance a human-readable name for observability.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the error classifier.
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: ErrorClassifier<Err> + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Sets a closure-based error classifier.
    ///
    /// The verdict is authoritative: anything other than
    /// [`RetryClass::Retryable`] means the error is not retried.
    pub fn classify_errors<F>(self, f: F) -> Self
    where
        F: Fn(&Err) -> RetryClass + Send + Sync + 'static,
    {
        self.classifier(FnClassifier::new(f))
    }

    /// Sets the token extractor.
    pub fn token_extractor<X>(mut self, extractor: X) -> Self
    where
        X: TokenExtractor<Res> + 'static,
    {
        self.token_extractor = Arc::new(extractor);
        self
    }

    /// Sets a closure-based token extractor.
    pub fn extract_tokens<F>(self, f: F) -> Self
    where
        F: Fn(&Res) -> u64 + Send + Sync + 'static,
    {
        self.token_extractor(FnExtractor::new(f))
    }

    /// Registers a callback for circuit breaker state transitions.
    ///
    /// Called with the state transitioned **from** and **to**.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &MiddlewareEvent| {
                if let MiddlewareEvent::StateTransition { from, to, .. } = event {
                    f(*from, *to);
                }
            }));
        self
    }

    /// Registers a callback invoked before each retry delay begins.
    ///
    /// Called with the zero-indexed attempt number and the computed delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &MiddlewareEvent| {
                if let MiddlewareEvent::RetryScheduled { attempt, delay, .. } = event {
                    f(*attempt, *delay);
                }
            }));
        self
    }

    /// Registers a callback for admission rejections.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(RejectionReason) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &MiddlewareEvent| {
                if let MiddlewareEvent::CallRejected { reason, .. } = event {
                    f(*reason);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> MiddlewareConfig<Res, Err> {
        MiddlewareConfig {
            circuit_breaker: self.circuit_breaker,
            rate_limiter: self.rate_limiter,
            retry: self.retry,
            enabled: self.enabled,
            verbose: self.verbose,
            name: self.name,
            classifier: self.classifier,
            token_extractor: self.token_extractor,
            event_listeners: self.event_listeners,
        }
    }
}

impl<Res, Err> Default for MiddlewareConfigBuilder<Res, Err> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cb = CircuitBreakerConfig::default();
        assert_eq!(cb.failure_threshold, 5);
        assert_eq!(cb.recovery_timeout, Duration::from_secs(30));
        assert_eq!(cb.half_open_max_calls, 3);
        assert_eq!(cb.success_threshold, 2);

        let rl = RateLimiterConfig::default();
        assert_eq!(rl.requests_per_minute, 60);
        assert_eq!(rl.tokens_per_minute, 100_000);
        assert_eq!(rl.burst_allowance, 1.5);

        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(60));
        assert_eq!(retry.exponential_base, 2.0);
        assert_eq!(retry.jitter, 0.1);
    }

    #[test]
    fn builder_composes() {
        let config: MiddlewareConfig<String, String> = MiddlewareConfig::builder()
            .name("completions")
            .enabled(false)
            .verbose(true)
            .circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            })
            .classify_errors(|_err| RetryClass::Retryable)
            .extract_tokens(|res: &String| res.len() as u64)
            .on_retry(|_, _| {})
            .build();

        assert!(!config.enabled);
        assert!(config.verbose);
        assert_eq!(config.name, "completions");
        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.event_listeners.len(), 1);
        assert_eq!(
            config.classifier.classify(&"anything".to_string()),
            RetryClass::Retryable
        );
        assert_eq!(config.token_extractor.tokens_used(&"four".to_string()), 4);
    }
}
