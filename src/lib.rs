//! Reliability middleware for LLM API calls.
//!
//! Wraps calls to a remote model provider with three coordinated patterns
//! plus metrics:
//!
//! - **Circuit breaker**: stops hammering an upstream that is failing, with
//!   lazy recovery through a half-open trial phase.
//! - **Rate limiter**: sliding-window admission control over both requests
//!   per minute and tokens per minute, with a configurable burst allowance.
//! - **Retry**: jittered exponential backoff for errors an injected
//!   classifier deems transient.
//!
//! The middleware is generic over the operation's response and error types.
//! It never inspects provider payloads itself; callers inject an
//! [`ErrorClassifier`] to decide retryability and a [`TokenExtractor`] to
//! report usage.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use llm_resilience::{
//!     CircuitBreakerConfig, MiddlewareConfig, ResilienceMiddleware, RetryClass,
//! };
//!
//! #[derive(Debug)]
//! struct ApiError {
//!     status: u16,
//! }
//!
//! struct Completion {
//!     text: String,
//!     total_tokens: u64,
//! }
//!
//! # async fn example() {
//! let middleware: ResilienceMiddleware<Completion, ApiError> = ResilienceMiddleware::new(
//!     MiddlewareConfig::builder()
//!         .name("completions")
//!         .circuit_breaker(CircuitBreakerConfig {
//!             failure_threshold: 5,
//!             recovery_timeout: Duration::from_secs(30),
//!             ..Default::default()
//!         })
//!         .classify_errors(|err: &ApiError| match err.status {
//!             429 | 500..=599 => RetryClass::Retryable,
//!             400..=499 => RetryClass::Fatal,
//!             _ => RetryClass::Unknown,
//!         })
//!         .extract_tokens(|res: &Completion| res.total_tokens)
//!         .build(),
//! );
//!
//! let result = middleware
//!     .execute(1200, || async {
//!         // call the provider here
//!         Ok(Completion { text: "hello".into(), total_tokens: 987 })
//!     })
//!     .await;
//! # let _ = result.map(|c| c.text);
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - `metrics`: emit counters and histograms through the `metrics` crate
//!   facade in addition to the built-in snapshot counters.
//! - `serde`: derive `Serialize` for [`MetricsSnapshot`], [`MiddlewareStatus`],
//!   and [`CircuitState`].

mod breaker;
mod classifier;
mod config;
mod error;
mod events;
mod limiter;
mod metrics;
mod middleware;
mod retry;
mod shared;
mod usage;

pub use breaker::{CircuitBreaker, CircuitState};
pub use classifier::{
    ErrorClassifier, FnClassifier, NeverRetry, RetryClass, SharedErrorClassifier,
};
pub use config::{
    CircuitBreakerConfig, MiddlewareConfig, MiddlewareConfigBuilder, RateLimiterConfig,
    RetryConfig,
};
pub use error::MiddlewareError;
pub use events::{
    BoxedEventListener, EventListener, EventListeners, FnListener, MiddlewareEvent,
    RejectionReason, ResilienceEvent,
};
pub use limiter::RateLimiter;
pub use metrics::MetricsSnapshot;
pub use middleware::{MiddlewareStatus, ResilienceMiddleware};
pub use retry::RetryPolicy;
pub use shared::SharedMiddleware;
pub use usage::{FnExtractor, NoUsage, SharedTokenExtractor, TokenExtractor};
