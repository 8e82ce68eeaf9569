//! The middleware orchestrator composing breaker, limiter, retry, and metrics.

use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::config::MiddlewareConfig;
use crate::error::MiddlewareError;
use crate::events::{MiddlewareEvent, RejectionReason};
use crate::limiter::RateLimiter;
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::retry::RetryPolicy;

/// Composed status view returned by [`ResilienceMiddleware::status`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MiddlewareStatus {
    /// Instance name, as configured.
    pub name: String,
    /// Whether the middleware is enabled.
    pub enabled: bool,
    /// Current circuit breaker state (lazy recovery applied).
    pub circuit_state: CircuitState,
    /// Current metrics snapshot.
    pub metrics: MetricsSnapshot,
}

/// Reliability middleware wrapping calls to an unreliable remote service.
///
/// Composes a [`CircuitBreaker`], a [`RateLimiter`], a [`RetryPolicy`], and a
/// metrics recorder around a caller-supplied operation. A shared instance is
/// used through `Arc`; every method takes `&self` and no lock is held across
/// an await point.
///
/// # Example
///
/// ```rust
/// use llm_resilience::{MiddlewareConfig, ResilienceMiddleware, RetryClass};
///
/// # #[derive(Debug)]
/// # struct ApiError { status: u16 }
/// # struct Completion { total_tokens: u64 }
/// # async fn example() {
/// let middleware: ResilienceMiddleware<Completion, ApiError> = ResilienceMiddleware::new(
///     MiddlewareConfig::builder()
///         .name("completions")
///         .classify_errors(|err: &ApiError| match err.status {
///             429 | 500..=599 => RetryClass::Retryable,
///             _ => RetryClass::Fatal,
///         })
///         .extract_tokens(|res: &Completion| res.total_tokens)
///         .build(),
/// );
///
/// let result = middleware
///     .execute(1200, || async { Ok(Completion { total_tokens: 987 }) })
///     .await;
/// # let _ = result;
/// # }
/// ```
pub struct ResilienceMiddleware<Res, Err> {
    config: MiddlewareConfig<Res, Err>,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    retry: RetryPolicy,
    metrics: Mutex<MetricsRecorder>,
}

impl<Res, Err> ResilienceMiddleware<Res, Err> {
    /// Creates a middleware instance from the given configuration.
    pub fn new(config: MiddlewareConfig<Res, Err>) -> Self {
        let breaker = CircuitBreaker::with_observability(
            config.circuit_breaker.clone(),
            config.name.clone(),
            config.event_listeners.clone(),
        );
        let limiter = RateLimiter::new(config.rate_limiter.clone());
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            breaker,
            limiter,
            retry,
            metrics: Mutex::new(MetricsRecorder::new()),
            config,
        }
    }

    /// Creates a middleware instance with all defaults.
    pub fn with_defaults() -> Self {
        Self::new(MiddlewareConfig::default())
    }

    /// Executes an operation under circuit breaking, rate limiting, and retry.
    ///
    /// `estimated_tokens` is the caller's estimate of the request cost, used
    /// only for rate-limiter admission; actual usage is extracted from the
    /// result afterwards.
    ///
    /// Admission rejections ([`MiddlewareError::CircuitOpen`],
    /// [`MiddlewareError::RateLimitExceeded`]) are raised before the
    /// operation runs and never enter the retry loop. Operation failures are
    /// retried transparently with jittered backoff while the classifier deems
    /// them retryable, then surfaced intact as
    /// [`MiddlewareError::Operation`].
    pub async fn execute<F, Fut>(
        &self,
        estimated_tokens: u64,
        mut operation: F,
    ) -> Result<Res, MiddlewareError<Err>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Res, Err>>,
    {
        if !self.config.enabled {
            return operation().await.map_err(MiddlewareError::Operation);
        }

        self.with_metrics(|m| m.total_requests += 1);

        if !self.breaker.can_execute() {
            self.with_metrics(|m| m.circuit_rejections += 1);
            self.reject(RejectionReason::CircuitOpen);
            return Err(MiddlewareError::CircuitOpen {
                state: self.breaker.state(),
                recovery_timeout: self.config.circuit_breaker.recovery_timeout,
            });
        }

        if let Err(retry_after) = self.limiter.can_proceed(estimated_tokens) {
            self.with_metrics(|m| m.rate_limit_rejections += 1);
            self.reject(RejectionReason::RateLimited);
            return Err(MiddlewareError::RateLimitExceeded { retry_after });
        }

        // The retry check is false at attempt == max_retries, so every
        // failure path eventually returns through fail_terminally.
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            match operation().await {
                Ok(result) => {
                    let latency = start.elapsed();
                    self.breaker.record_success();
                    self.with_metrics(|m| {
                        m.successful_requests += 1;
                        m.record_latency(latency.as_secs_f64() * 1000.0);
                        m.last_request_time = Some(Instant::now());
                    });

                    let tokens_used = self.config.token_extractor.tokens_used(&result);
                    self.limiter.record_request(tokens_used);
                    if tokens_used > 0 {
                        self.with_metrics(|m| m.tokens_received += tokens_used);
                    }

                    self.emit(MiddlewareEvent::CallSucceeded {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                        latency,
                    });
                    #[cfg(feature = "metrics")]
                    {
                        counter!("llm_middleware_requests_total", "middleware" => self.config.name.clone(), "outcome" => "success").increment(1);
                        histogram!("llm_middleware_latency_seconds", "middleware" => self.config.name.clone())
                            .record(latency.as_secs_f64());
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if self.config.verbose {
                        tracing::info!(
                            middleware = %self.config.name,
                            attempt = attempt + 1,
                            "attempt failed"
                        );
                    } else {
                        tracing::debug!(
                            middleware = %self.config.name,
                            attempt = attempt + 1,
                            "attempt failed"
                        );
                    }

                    if !self
                        .retry
                        .should_retry(attempt, &error, &*self.config.classifier)
                    {
                        return Err(self.fail_terminally(error, attempt + 1));
                    }

                    self.with_metrics(|m| m.retried_requests += 1);
                    let delay = self.retry.delay_for(attempt);
                    self.emit(MiddlewareEvent::RetryScheduled {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempt,
                        delay,
                    });
                    if self.config.verbose {
                        tracing::info!(
                            middleware = %self.config.name,
                            attempt = attempt + 1,
                            delay = ?delay,
                            "retrying after backoff"
                        );
                    }
                    #[cfg(feature = "metrics")]
                    counter!("llm_middleware_retries_total", "middleware" => self.config.name.clone())
                        .increment(1);

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn fail_terminally(&self, error: Err, attempts: u32) -> MiddlewareError<Err> {
        self.breaker.record_failure();
        self.with_metrics(|m| m.failed_requests += 1);
        self.emit(MiddlewareEvent::CallFailed {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            attempts,
        });
        #[cfg(feature = "metrics")]
        counter!("llm_middleware_requests_total", "middleware" => self.config.name.clone(), "outcome" => "failure").increment(1);
        MiddlewareError::Operation(error)
    }

    fn reject(&self, reason: RejectionReason) {
        tracing::debug!(
            middleware = %self.config.name,
            reason = ?reason,
            "call rejected at admission"
        );
        self.emit(MiddlewareEvent::CallRejected {
            pattern_name: self.config.name.clone(),
            timestamp: Instant::now(),
            reason,
        });
        #[cfg(feature = "metrics")]
        counter!("llm_middleware_requests_total", "middleware" => self.config.name.clone(), "outcome" => "rejected").increment(1);
    }

    /// Records cost from an external calculation.
    pub fn record_cost(&self, cost: f64) {
        self.with_metrics(|m| m.total_cost += cost);
    }

    /// Records tokens sent, for usage not derivable from the result.
    pub fn record_tokens_sent(&self, tokens: u64) {
        self.with_metrics(|m| m.tokens_sent += tokens);
    }

    /// Returns a snapshot of the current metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.lock().unwrap().snapshot()
    }

    /// Returns the composed middleware status.
    pub fn status(&self) -> MiddlewareStatus {
        MiddlewareStatus {
            name: self.config.name.clone(),
            enabled: self.config.enabled,
            circuit_state: self.breaker.state(),
            metrics: self.metrics(),
        }
    }

    /// Resets the circuit breaker and replaces the metrics recorder.
    ///
    /// The rate limiter's sliding window is left untouched: the remote
    /// quota does not reset just because local state did.
    pub fn reset(&self) {
        self.breaker.reset();
        *self.metrics.lock().unwrap() = MetricsRecorder::new();
    }

    /// Whether this instance is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Access to the underlying circuit breaker, for inspection or manual
    /// control (e.g. forcing the circuit open during an incident).
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Access to the underlying rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn with_metrics<R>(&self, f: impl FnOnce(&mut MetricsRecorder) -> R) -> R {
        f(&mut self.metrics.lock().unwrap())
    }

    fn emit(&self, event: MiddlewareEvent) {
        self.config.event_listeners.emit(&event);
    }
}

impl<Res, Err> std::fmt::Debug for ResilienceMiddleware<Res, Err> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceMiddleware")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .field("limiter", &self.limiter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RetryClass;
    use crate::config::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
            jitter: 0.0,
        }
    }

    fn middleware() -> ResilienceMiddleware<u64, String> {
        ResilienceMiddleware::new(
            MiddlewareConfig::builder()
                .retry(fast_retry())
                .classify_errors(|err: &String| {
                    if err.contains("transient") {
                        RetryClass::Retryable
                    } else {
                        RetryClass::Fatal
                    }
                })
                .extract_tokens(|tokens: &u64| *tokens)
                .build(),
        )
    }

    #[tokio::test]
    async fn success_updates_counters_and_window() {
        let mw = middleware();
        let result = mw.execute(100, || async { Ok(42u64) }).await;
        assert_eq!(result.unwrap(), 42);

        let metrics = mw.metrics();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.tokens_received, 42);
        assert!((metrics.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(metrics.average_latency_ms >= 0.0);
        assert!(metrics.last_request_age.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let mw = middleware();
        let calls = AtomicU32::new(0);
        let result = mw
            .execute(0, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient overload".to_string())
                    } else {
                        Ok(7u64)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let metrics = mw.metrics();
        assert_eq!(metrics.retried_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_the_final_error() {
        let mw = middleware();
        let calls = AtomicU32::new(0);
        let result = mw
            .execute(0, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<u64, _>(format!("transient {n}")) }
            })
            .await;

        // Initial attempt plus max_retries, ending on the last attempt's error.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            result.unwrap_err().into_operation().unwrap(),
            "transient 3"
        );

        let metrics = mw.metrics();
        assert_eq!(metrics.retried_requests, 3);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(mw.circuit_breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let mw = middleware();
        let calls = AtomicU32::new(0);
        let result = mw
            .execute(0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u64, _>("invalid request".to_string()) }
            })
            .await;
        assert_eq!(
            result.unwrap_err().into_operation().unwrap(),
            "invalid request"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(mw.metrics().failed_requests, 1);
        assert_eq!(mw.circuit_breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking_operation() {
        let mw = middleware();
        mw.circuit_breaker().force_open();

        let calls = AtomicU32::new(0);
        let result = mw
            .execute(0, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(1u64) }
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mw.metrics().circuit_rejections, 1);
    }

    #[tokio::test]
    async fn disabled_middleware_passes_through_untouched() {
        let mw: ResilienceMiddleware<u64, String> =
            ResilienceMiddleware::new(MiddlewareConfig::builder().enabled(false).build());
        mw.circuit_breaker().force_open();

        let result = mw.execute(0, || async { Ok(5u64) }).await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(mw.metrics().total_requests, 0);
    }

    #[tokio::test]
    async fn external_accounting_accumulates() {
        let mw = middleware();
        mw.record_cost(0.25);
        mw.record_cost(0.50);
        mw.record_tokens_sent(120);
        mw.record_tokens_sent(80);

        let metrics = mw.metrics();
        assert!((metrics.total_cost - 0.75).abs() < f64::EPSILON);
        assert_eq!(metrics.tokens_sent, 200);
    }

    #[tokio::test]
    async fn reset_clears_breaker_and_metrics() {
        let mw = middleware();
        mw.circuit_breaker().force_open();
        mw.record_cost(1.0);
        mw.reset();

        assert_eq!(mw.circuit_breaker().state(), CircuitState::Closed);
        assert_eq!(mw.metrics().total_cost, 0.0);
    }

    #[tokio::test]
    async fn status_composes_name_state_and_metrics() {
        let mw = middleware();
        let _ = mw.execute(10, || async { Ok(3u64) }).await;

        let status = mw.status();
        assert_eq!(status.name, "<unnamed>");
        assert!(status.enabled);
        assert_eq!(status.circuit_state, CircuitState::Closed);
        assert_eq!(status.metrics.total_requests, 1);
    }
}
