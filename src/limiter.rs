//! Sliding-window rate limiter tracking request count and token volume.
//!
//! Two time-ordered logs are kept: one of request timestamps and one of
//! `(timestamp, tokens)` pairs. Both are append-only and pruned from the
//! front against a trailing 60-second window on every admission check, so
//! memory stays proportional to the call volume of any one window.
//!
//! Admission ([`RateLimiter::can_proceed`]) and recording
//! ([`RateLimiter::record_request`]) are deliberately separate steps so the
//! orchestrator can check, run the operation, and record actual usage
//! afterwards.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimiterConfig;

/// Width of the sliding window.
pub(crate) const WINDOW: Duration = Duration::from_secs(60);

/// Suggested wait times are floored at this value.
const MIN_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct WindowState {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.requests.front() {
            if now.duration_since(*front) > WINDOW {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some((front, _)) = self.tokens.front() {
            if now.duration_since(*front) > WINDOW {
                self.tokens.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Time until `oldest` ages out of the window, floored at 100ms.
fn wait_for(oldest: Instant, now: Instant) -> Duration {
    (oldest + WINDOW).saturating_duration_since(now).max(MIN_WAIT)
}

/// Sliding-window rate limiter over requests per minute and tokens per minute.
///
/// Both limits are scaled by the configured burst allowance. All log reads
/// and mutations are serialized by one mutex.
pub struct RateLimiter {
    config: RateLimiterConfig,
    inner: Mutex<WindowState>,
}

impl RateLimiter {
    /// Creates a new limiter with an empty window.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(WindowState::default()),
        }
    }

    /// Checks whether a request estimated at `estimated_tokens` may proceed.
    ///
    /// Returns `Err(wait)` with a suggested wait time when either the request
    /// count or the token volume for the current window is exhausted.
    pub fn can_proceed(&self, estimated_tokens: u64) -> Result<(), Duration> {
        self.can_proceed_at(estimated_tokens, Instant::now())
    }

    pub(crate) fn can_proceed_at(
        &self,
        estimated_tokens: u64,
        now: Instant,
    ) -> Result<(), Duration> {
        let mut window = self.inner.lock().unwrap();
        window.prune(now);

        let max_requests =
            (self.config.requests_per_minute as f64 * self.config.burst_allowance) as usize;
        if window.requests.len() >= max_requests {
            let wait = window
                .requests
                .front()
                .map(|oldest| wait_for(*oldest, now))
                .unwrap_or(MIN_WAIT);
            return Err(wait);
        }

        let max_tokens =
            (self.config.tokens_per_minute as f64 * self.config.burst_allowance) as u64;
        let tokens_in_window: u64 = window.tokens.iter().map(|(_, tokens)| tokens).sum();
        if tokens_in_window + estimated_tokens > max_tokens {
            let wait = window
                .tokens
                .front()
                .map(|(oldest, _)| wait_for(*oldest, now))
                .unwrap_or(MIN_WAIT);
            return Err(wait);
        }

        Ok(())
    }

    /// Records a completed request and its actual token usage.
    ///
    /// The request timestamp is always logged; a token entry is logged only
    /// when `tokens_used` is nonzero.
    pub fn record_request(&self, tokens_used: u64) {
        self.record_request_at(tokens_used, Instant::now());
    }

    pub(crate) fn record_request_at(&self, tokens_used: u64, now: Instant) {
        let mut window = self.inner.lock().unwrap();
        window.requests.push_back(now);
        if tokens_used > 0 {
            window.tokens.push_back((now, tokens_used));
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let window = self.inner.lock().unwrap();
        f.debug_struct("RateLimiter")
            .field("requests_in_window", &window.requests.len())
            .field("token_entries_in_window", &window.tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rpm: u32, tpm: u64, burst: f64) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: rpm,
            tokens_per_minute: tpm,
            burst_allowance: burst,
        }
    }

    #[test]
    fn allows_within_limits() {
        let limiter = RateLimiter::new(config(10, 1000, 1.0));
        assert!(limiter.can_proceed(100).is_ok());
    }

    #[test]
    fn denies_at_request_cap_and_readmits_after_window() {
        // floor(4 * 1.5) = 6 requests allowed.
        let limiter = RateLimiter::new(config(4, 100_000, 1.5));
        let base = Instant::now();
        for _ in 0..6 {
            limiter.record_request_at(0, base);
        }

        let wait = limiter
            .can_proceed_at(0, base)
            .expect_err("seventh request should be denied");
        assert!(wait > Duration::ZERO);

        // Once the window has fully elapsed the log prunes itself.
        assert!(limiter
            .can_proceed_at(0, base + Duration::from_secs(61))
            .is_ok());
    }

    #[test]
    fn suggested_wait_tracks_oldest_entry() {
        let limiter = RateLimiter::new(config(1, 100_000, 1.0));
        let base = Instant::now();
        limiter.record_request_at(0, base);

        // The slot frees when the entry ages out, one second from "now".
        let wait = limiter
            .can_proceed_at(0, base + Duration::from_secs(59))
            .expect_err("at cap");
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[test]
    fn wait_is_floored() {
        let limiter = RateLimiter::new(config(1, 100_000, 1.0));
        let base = Instant::now();
        limiter.record_request_at(0, base);

        // Entry ages out in 1ms, but the suggestion never dips below 100ms.
        let wait = limiter
            .can_proceed_at(0, base + Duration::from_millis(59_999))
            .expect_err("at cap");
        assert_eq!(wait, Duration::from_millis(100));
    }

    #[test]
    fn denies_when_token_budget_exhausted() {
        let limiter = RateLimiter::new(config(100, 100, 1.0));
        let base = Instant::now();
        limiter.record_request_at(100, base);

        let wait = limiter
            .can_proceed_at(1, base)
            .expect_err("token budget spent");
        assert!(wait >= Duration::from_millis(100));
    }

    #[test]
    fn token_budget_recovers_after_window() {
        let limiter = RateLimiter::new(config(100, 100, 1.0));
        let base = Instant::now();
        limiter.record_request_at(100, base);

        assert!(limiter
            .can_proceed_at(50, base + Duration::from_secs(61))
            .is_ok());
    }

    #[test]
    fn zero_token_requests_do_not_consume_token_budget() {
        let limiter = RateLimiter::new(config(100, 100, 1.0));
        let base = Instant::now();
        for _ in 0..10 {
            limiter.record_request_at(0, base);
        }
        assert!(limiter.can_proceed_at(100, base).is_ok());
    }

    #[test]
    fn oversized_single_request_is_denied() {
        let limiter = RateLimiter::new(config(100, 100, 1.0));
        let base = Instant::now();
        // Nothing logged yet, but the estimate alone exceeds the budget.
        assert!(limiter.can_proceed_at(101, base).is_err());
    }

    #[test]
    fn burst_allowance_scales_limits() {
        let limiter = RateLimiter::new(config(2, 100_000, 1.5));
        let base = Instant::now();
        // floor(2 * 1.5) = 3 requests.
        for _ in 0..3 {
            assert!(limiter.can_proceed_at(0, base).is_ok());
            limiter.record_request_at(0, base);
        }
        assert!(limiter.can_proceed_at(0, base).is_err());
    }
}
