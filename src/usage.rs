//! Token usage extraction from operation results.
//!
//! Rate-limiter accounting and token metrics need to know how many tokens a
//! successful call consumed. The middleware cannot know the shape of the
//! response, so a [`TokenExtractor`] is injected alongside the operation.

use std::sync::Arc;

/// Trait for extracting a token count from a successful operation result.
///
/// # Type Parameters
///
/// - `Res`: The success response type of the wrapped operation
pub trait TokenExtractor<Res>: Send + Sync {
    /// Returns the number of tokens the result consumed, or 0 when the
    /// count is unavailable or not applicable.
    fn tokens_used(&self, result: &Res) -> u64;
}

/// Type alias for a shared, dynamically dispatched extractor.
pub type SharedTokenExtractor<Res> = Arc<dyn TokenExtractor<Res>>;

/// Default extractor for results that carry no usage information.
///
/// Always reports 0, which disables token-volume rate accounting while
/// leaving request-count accounting intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUsage;

impl<Res> TokenExtractor<Res> for NoUsage {
    fn tokens_used(&self, _result: &Res) -> u64 {
        0
    }
}

/// A token extractor backed by a closure.
///
/// # Example
///
/// ```rust
/// use llm_resilience::{FnExtractor, TokenExtractor};
///
/// struct Completion {
///     total_tokens: u64,
/// }
///
/// let extractor = FnExtractor::new(|res: &Completion| res.total_tokens);
/// assert_eq!(extractor.tokens_used(&Completion { total_tokens: 42 }), 42);
/// ```
#[derive(Clone)]
pub struct FnExtractor<F> {
    f: Arc<F>,
}

impl<F> FnExtractor<F> {
    /// Creates a new `FnExtractor` from the given closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Res> TokenExtractor<Res> for FnExtractor<F>
where
    F: Fn(&Res) -> u64 + Send + Sync,
{
    fn tokens_used(&self, result: &Res) -> u64 {
        (self.f)(result)
    }
}

impl<F> std::fmt::Debug for FnExtractor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExtractor")
            .field("f", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_usage_reports_zero() {
        assert_eq!(TokenExtractor::<String>::tokens_used(&NoUsage, &"ok".to_string()), 0);
    }

    #[test]
    fn fn_extractor_reads_result() {
        let extractor = FnExtractor::new(|res: &(u64, &str)| res.0);
        assert_eq!(extractor.tokens_used(&(1500, "completion")), 1500);
    }
}
