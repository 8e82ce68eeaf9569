//! Event system for middleware observability.
//!
//! Listeners registered on a [`crate::MiddlewareConfig`] receive an event for
//! every notable thing the middleware does: circuit state transitions,
//! admission rejections, scheduled retries, and call outcomes.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::breaker::CircuitState;

/// Trait for events emitted by the middleware.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Returns the type of event (e.g., "state_transition", "call_rejected").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the middleware instance that emitted this event.
    fn pattern_name(&self) -> &str;
}

/// Why an admission check rejected a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The circuit breaker is open (or half-open with no trial slots left).
    CircuitOpen,
    /// The sliding-window rate limiter is at capacity.
    RateLimited,
}

/// Events emitted by [`crate::ResilienceMiddleware`] and its circuit breaker.
#[derive(Debug, Clone)]
pub enum MiddlewareEvent {
    /// The circuit breaker moved between states.
    StateTransition {
        pattern_name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
    /// An admission check rejected the call before the operation ran.
    CallRejected {
        pattern_name: String,
        timestamp: Instant,
        reason: RejectionReason,
    },
    /// A failed attempt will be retried after the given delay.
    RetryScheduled {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
    },
    /// The operation completed successfully.
    CallSucceeded {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
        latency: Duration,
    },
    /// The operation failed terminally (non-retryable or retries exhausted).
    CallFailed {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
    },
}

impl ResilienceEvent for MiddlewareEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MiddlewareEvent::StateTransition { .. } => "state_transition",
            MiddlewareEvent::CallRejected { .. } => "call_rejected",
            MiddlewareEvent::RetryScheduled { .. } => "retry_scheduled",
            MiddlewareEvent::CallSucceeded { .. } => "call_succeeded",
            MiddlewareEvent::CallFailed { .. } => "call_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            MiddlewareEvent::StateTransition { timestamp, .. }
            | MiddlewareEvent::CallRejected { timestamp, .. }
            | MiddlewareEvent::RetryScheduled { timestamp, .. }
            | MiddlewareEvent::CallSucceeded { timestamp, .. }
            | MiddlewareEvent::CallFailed { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            MiddlewareEvent::StateTransition { pattern_name, .. }
            | MiddlewareEvent::CallRejected { pattern_name, .. }
            | MiddlewareEvent::RetryScheduled { pattern_name, .. }
            | MiddlewareEvent::CallSucceeded { pattern_name, .. }
            | MiddlewareEvent::CallFailed { pattern_name, .. } => pattern_name,
        }
    }
}

/// Trait for listening to middleware events.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for boxed event listeners.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners.
#[derive(Clone)]
pub struct EventListeners<E: ResilienceEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: ResilienceEvent> EventListeners<E> {
    /// Creates a new empty event listener collection.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener to the collection.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits an event to all registered listeners.
    ///
    /// If a listener panics, the panic is caught and the remaining listeners
    /// will still be called.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }

    /// Returns true if there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ResilienceEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple function-based event listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new function-based listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ResilienceEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
