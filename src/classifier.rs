//! Error classification for retry decisions.
//!
//! The middleware never inspects the wrapped operation's error type itself;
//! an injected [`ErrorClassifier`] decides whether a given error is worth
//! retrying. An unknown verdict is treated as non-retryable: the classifier
//! is authoritative, and the absence of a verdict means "do not retry".

use std::sync::Arc;

/// Verdict returned by an [`ErrorClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// The error is transient; the call may be retried.
    Retryable,
    /// The error is permanent; retrying cannot help.
    Fatal,
    /// The classifier has no verdict for this error. Treated as non-retryable.
    Unknown,
}

/// Trait for classifying whether an operation error is retryable.
///
/// # Type Parameters
///
/// - `Err`: The error type of the wrapped operation
pub trait ErrorClassifier<Err>: Send + Sync {
    /// Classifies the given error.
    fn classify(&self, error: &Err) -> RetryClass;
}

/// Type alias for a shared, dynamically dispatched classifier.
pub type SharedErrorClassifier<Err> = Arc<dyn ErrorClassifier<Err>>;

/// Default classifier with no knowledge of any error taxonomy.
///
/// Classifies every error as [`RetryClass::Unknown`], so nothing is retried
/// until the caller supplies a real classifier for their upstream API.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl<Err> ErrorClassifier<Err> for NeverRetry {
    fn classify(&self, _error: &Err) -> RetryClass {
        RetryClass::Unknown
    }
}

/// An error classifier backed by a closure.
///
/// # Example
///
/// ```rust
/// use llm_resilience::{ErrorClassifier, FnClassifier, RetryClass};
/// use std::io::{Error, ErrorKind};
///
/// let classifier = FnClassifier::new(|err: &Error| match err.kind() {
///     ErrorKind::ConnectionRefused | ErrorKind::TimedOut => RetryClass::Retryable,
///     ErrorKind::PermissionDenied => RetryClass::Fatal,
///     _ => RetryClass::Unknown,
/// });
///
/// let timeout = Error::new(ErrorKind::TimedOut, "timeout");
/// assert_eq!(classifier.classify(&timeout), RetryClass::Retryable);
/// ```
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    /// Creates a new `FnClassifier` from the given closure.
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Err> ErrorClassifier<Err> for FnClassifier<F>
where
    F: Fn(&Err) -> RetryClass + Send + Sync,
{
    fn classify(&self, error: &Err) -> RetryClass {
        (self.f)(error)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier")
            .field("f", &"<closure>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_retry_has_no_verdict() {
        let classifier = NeverRetry;
        assert_eq!(
            ErrorClassifier::<String>::classify(&classifier, &"boom".to_string()),
            RetryClass::Unknown
        );
    }

    #[test]
    fn fn_classifier_custom_logic() {
        let classifier = FnClassifier::new(|err: &String| {
            if err.contains("429") {
                RetryClass::Retryable
            } else {
                RetryClass::Fatal
            }
        });

        assert_eq!(
            classifier.classify(&"429 too many requests".to_string()),
            RetryClass::Retryable
        );
        assert_eq!(
            classifier.classify(&"401 unauthorized".to_string()),
            RetryClass::Fatal
        );
    }
}
