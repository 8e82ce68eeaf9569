//! Process-wide shared middleware slot.
//!
//! Mirrors the common deployment shape where one middleware instance guards
//! one upstream for the whole process. The slot is generic, so an application
//! declares one `static` per upstream it talks to.

use std::sync::{Arc, Mutex};

use crate::config::MiddlewareConfig;
use crate::middleware::ResilienceMiddleware;

/// A lazily initialized, swappable slot holding a shared middleware instance.
///
/// ```rust
/// use llm_resilience::{MiddlewareConfig, SharedMiddleware};
///
/// static COMPLETIONS: SharedMiddleware<String, String> = SharedMiddleware::new();
///
/// let mw = COMPLETIONS.get_or_init(|| {
///     MiddlewareConfig::builder().name("completions").build()
/// });
/// assert!(mw.is_enabled());
/// ```
pub struct SharedMiddleware<Res, Err> {
    slot: Mutex<Option<Arc<ResilienceMiddleware<Res, Err>>>>,
}

impl<Res, Err> SharedMiddleware<Res, Err> {
    /// Creates an empty slot. Usable in `static` position.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns the current instance, initializing it from `config` on first
    /// use. The configuration closure only runs if the slot is empty.
    pub fn get_or_init<F>(&self, config: F) -> Arc<ResilienceMiddleware<Res, Err>>
    where
        F: FnOnce() -> MiddlewareConfig<Res, Err>,
    {
        let mut slot = self.slot.lock().unwrap();
        match &*slot {
            Some(middleware) => Arc::clone(middleware),
            None => {
                let middleware = Arc::new(ResilienceMiddleware::new(config()));
                *slot = Some(Arc::clone(&middleware));
                middleware
            }
        }
    }

    /// Returns the current instance without initializing.
    pub fn get(&self) -> Option<Arc<ResilienceMiddleware<Res, Err>>> {
        self.slot.lock().unwrap().as_ref().map(Arc::clone)
    }

    /// Atomically replaces the instance, returning the previous one.
    ///
    /// In-flight calls keep running against the instance they started with;
    /// only subsequent `get`/`get_or_init` callers see the replacement.
    pub fn replace(
        &self,
        config: MiddlewareConfig<Res, Err>,
    ) -> Option<Arc<ResilienceMiddleware<Res, Err>>> {
        let middleware = Arc::new(ResilienceMiddleware::new(config));
        self.slot.lock().unwrap().replace(middleware)
    }

    /// Clears the slot, returning the instance it held.
    pub fn reset(&self) -> Option<Arc<ResilienceMiddleware<Res, Err>>> {
        self.slot.lock().unwrap().take()
    }
}

impl<Res, Err> Default for SharedMiddleware<Res, Err> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_runs_once() {
        let shared: SharedMiddleware<u64, String> = SharedMiddleware::new();
        assert!(shared.get().is_none());

        let first = shared.get_or_init(|| MiddlewareConfig::builder().name("a").build());
        let second = shared.get_or_init(|| panic!("slot already initialized"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.status().name, "a");
    }

    #[test]
    fn replace_swaps_the_instance() {
        let shared: SharedMiddleware<u64, String> = SharedMiddleware::new();
        let first = shared.get_or_init(|| MiddlewareConfig::builder().name("a").build());

        let previous = shared
            .replace(MiddlewareConfig::builder().name("b").build())
            .unwrap();
        assert!(Arc::ptr_eq(&first, &previous));

        let current = shared.get().unwrap();
        assert_eq!(current.status().name, "b");
    }

    #[test]
    fn reset_empties_the_slot() {
        let shared: SharedMiddleware<u64, String> = SharedMiddleware::new();
        shared.get_or_init(MiddlewareConfig::default);
        assert!(shared.reset().is_some());
        assert!(shared.get().is_none());
    }
}
