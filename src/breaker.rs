//! Circuit breaker with lazy time-based recovery.
//!
//! ## States
//! - **Closed**: normal operation, calls pass through. Failures accumulate;
//!   successes decay the failure count so stale failures don't bias the
//!   breaker forever.
//! - **Open**: calls are rejected. After `recovery_timeout` has elapsed the
//!   next state read moves to half-open. There is no background timer, the
//!   transition happens lazily inside the same lock as every mutation.
//! - **HalfOpen**: a bounded number of trial calls probe recovery. Enough
//!   successes close the circuit; a single failure reopens it.

use std::sync::Mutex;
use std::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::events::{EventListeners, MiddlewareEvent};

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed,
    /// The circuit is open and calls are rejected.
    Open,
    /// The circuit is half-open and a limited number of trial calls are allowed.
    HalfOpen,
}

impl CircuitState {
    /// Returns a lowercase textual name, suitable for status reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

type Transition = (CircuitState, CircuitState);

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    half_open_calls: u32,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            half_open_calls: 0,
        }
    }

    /// Applies the lazy Open -> HalfOpen transition if the recovery timeout
    /// has elapsed. Idempotent within a half-open cycle.
    fn refresh(&mut self, config: &CircuitBreakerConfig, now: Instant) -> Option<Transition> {
        if self.state == CircuitState::Open {
            if let Some(last_failure) = self.last_failure_time {
                if now.duration_since(last_failure) >= config.recovery_timeout {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_calls = 0;
                    self.success_count = 0;
                    return Some((CircuitState::Open, CircuitState::HalfOpen));
                }
            }
        }
        None
    }

    fn try_acquire(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> (bool, Option<Transition>) {
        let transition = self.refresh(config, now);
        let permitted = match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if self.half_open_calls < config.half_open_max_calls {
                    self.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        };
        (permitted, transition)
    }

    fn record_success(&mut self, config: &CircuitBreakerConfig) -> Option<Transition> {
        match self.state {
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.state = CircuitState::Closed;
                    self.failure_count = 0;
                    return Some((CircuitState::HalfOpen, CircuitState::Closed));
                }
                None
            }
            CircuitState::Closed => {
                self.failure_count = self.failure_count.saturating_sub(1);
                None
            }
            CircuitState::Open => None,
        }
    }

    fn record_failure(&mut self, config: &CircuitBreakerConfig, now: Instant) -> Option<Transition> {
        self.failure_count += 1;
        self.last_failure_time = Some(now);
        match self.state {
            // One strike reopens while probing recovery.
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }
            CircuitState::Closed if self.failure_count >= config.failure_threshold => {
                self.state = CircuitState::Open;
                Some((CircuitState::Closed, CircuitState::Open))
            }
            _ => None,
        }
    }

    fn force_open(&mut self, now: Instant) -> Option<Transition> {
        let from = self.state;
        self.state = CircuitState::Open;
        self.last_failure_time = Some(now);
        (from != CircuitState::Open).then_some((from, CircuitState::Open))
    }

    fn reset(&mut self) -> Option<Transition> {
        let from = self.state;
        *self = Self::new();
        (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
    }
}

/// Circuit breaker guarding an unreliable dependency.
///
/// All reads and mutations are serialized by a single mutex; reads that
/// trigger the Open -> HalfOpen transition take the same lock as writes, so
/// two callers cannot transition independently.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    name: String,
    listeners: EventListeners<MiddlewareEvent>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a new breaker in the closed state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_observability(config, "<unnamed>".to_string(), EventListeners::new())
    }

    pub(crate) fn with_observability(
        config: CircuitBreakerConfig,
        name: String,
        listeners: EventListeners<MiddlewareEvent>,
    ) -> Self {
        Self {
            config,
            name,
            listeners,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Returns the current state, applying the lazy recovery transition.
    pub fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    pub(crate) fn state_at(&self, now: Instant) -> CircuitState {
        let (state, transition) = {
            let mut inner = self.inner.lock().unwrap();
            let transition = inner.refresh(&self.config, now);
            (inner.state, transition)
        };
        self.notify(transition);
        state
    }

    /// Returns whether a call may proceed right now.
    ///
    /// In the half-open state this consumes one of the limited trial slots.
    pub fn can_execute(&self) -> bool {
        self.can_execute_at(Instant::now())
    }

    pub(crate) fn can_execute_at(&self, now: Instant) -> bool {
        let (permitted, transition) = {
            let mut inner = self.inner.lock().unwrap();
            inner.try_acquire(&self.config, now)
        };
        self.notify(transition);
        permitted
    }

    /// Records a successful call outcome.
    pub fn record_success(&self) {
        let transition = self.inner.lock().unwrap().record_success(&self.config);
        self.notify(transition);
    }

    /// Records a failed call outcome.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub(crate) fn record_failure_at(&self, now: Instant) {
        let transition = self.inner.lock().unwrap().record_failure(&self.config, now);
        self.notify(transition);
    }

    /// Forces the circuit into the open state, as if a failure had just
    /// tripped it. Recovery follows the normal timeout.
    pub fn force_open(&self) {
        let transition = self.inner.lock().unwrap().force_open(Instant::now());
        self.notify(transition);
    }

    /// Resets to closed with all counters zeroed, bypassing the timeout.
    pub fn reset(&self) {
        let transition = self.inner.lock().unwrap().reset();
        self.notify(transition);
    }

    /// Current failure count, for diagnostics.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    fn notify(&self, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            tracing::info!(breaker = %self.name, from = ?from, to = ?to, "circuit state transition");
            self.listeners.emit(&MiddlewareEvent::StateTransition {
                pattern_name: self.name.clone(),
                timestamp: Instant::now(),
                from,
                to,
            });
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.inner.lock().unwrap().state)
            .finish()
    }
}
