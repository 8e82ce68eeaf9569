//! Aggregated middleware metrics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Size of the rolling latency sample buffer.
const LATENCY_SAMPLES: usize = 100;

/// Accumulates counters and a bounded rolling-average latency.
///
/// Embedded in the middleware behind its metrics mutex rather than locked
/// separately; see [`crate::ResilienceMiddleware::metrics`] for snapshots.
#[derive(Debug)]
pub(crate) struct MetricsRecorder {
    pub(crate) total_requests: u64,
    pub(crate) successful_requests: u64,
    pub(crate) failed_requests: u64,
    pub(crate) retried_requests: u64,
    pub(crate) circuit_rejections: u64,
    pub(crate) rate_limit_rejections: u64,
    pub(crate) tokens_sent: u64,
    pub(crate) tokens_received: u64,
    pub(crate) total_cost: f64,
    pub(crate) last_request_time: Option<Instant>,
    latencies: VecDeque<f64>,
    average_latency_ms: f64,
}

impl MetricsRecorder {
    pub(crate) fn new() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            retried_requests: 0,
            circuit_rejections: 0,
            rate_limit_rejections: 0,
            tokens_sent: 0,
            tokens_received: 0,
            total_cost: 0.0,
            last_request_time: None,
            latencies: VecDeque::with_capacity(LATENCY_SAMPLES),
            average_latency_ms: 0.0,
        }
    }

    /// Appends a latency sample, evicting the oldest beyond 100 samples, and
    /// recomputes the rolling mean.
    pub(crate) fn record_latency(&mut self, latency_ms: f64) {
        if self.latencies.len() == LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
        self.average_latency_ms =
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64;
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let success_rate = if self.total_requests > 0 {
            self.successful_requests as f64 / self.total_requests as f64
        } else {
            0.0
        };
        MetricsSnapshot {
            last_request_age: self.last_request_time.map(|t| t.elapsed()),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            retried_requests: self.retried_requests,
            circuit_rejections: self.circuit_rejections,
            rate_limit_rejections: self.rate_limit_rejections,
            tokens_sent: self.tokens_sent,
            tokens_received: self.tokens_received,
            total_cost: self.total_cost,
            average_latency_ms: self.average_latency_ms,
            success_rate,
        }
    }
}

/// Point-in-time view of all middleware counters, suitable for external
/// reporting.
///
/// Counters are monotonically increasing until [`crate::ResilienceMiddleware::reset`]
/// replaces the recorder wholesale. A snapshot taken while calls are in
/// flight is internally consistent per counter but not transactional across
/// components.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    /// Calls that entered the middleware (admitted or not).
    pub total_requests: u64,
    /// Operations that returned successfully.
    pub successful_requests: u64,
    /// Operations that failed terminally.
    pub failed_requests: u64,
    /// Individual retry attempts scheduled.
    pub retried_requests: u64,
    /// Calls rejected by the circuit breaker at admission.
    pub circuit_rejections: u64,
    /// Calls rejected by the rate limiter at admission.
    pub rate_limit_rejections: u64,
    /// Tokens sent, recorded via [`crate::ResilienceMiddleware::record_tokens_sent`].
    pub tokens_sent: u64,
    /// Tokens received, as reported by the token extractor.
    pub tokens_received: u64,
    /// Accumulated cost, recorded via [`crate::ResilienceMiddleware::record_cost`].
    pub total_cost: f64,
    /// Rolling mean over the last 100 latency samples, in milliseconds.
    pub average_latency_ms: f64,
    /// `successful_requests / total_requests`, 0.0 when no requests yet.
    pub success_rate: f64,
    /// Time since the last successful request, `None` before the first one.
    pub last_request_age: Option<Duration>,
}
