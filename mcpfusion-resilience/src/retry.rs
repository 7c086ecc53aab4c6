//! Retry policy and executor (spec §4.7).
//!
//! Retries are driven by [`mcpfusion_core::ErrorCategory`] rather than a
//! bespoke retryable/transient pair of booleans: every error in the
//! gateway already reduces to a category, so the policy just needs a set
//! of categories it is willing to retry plus a couple of category-specific
//! rules (honour `Retry-After` for `rate_limited`, cap `permission_denied`
//! retries at one attempt after the caller re-authenticates).

use mcpfusion_core::{Categorized, ErrorCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::BackoffCalculator;
use crate::circuit_breaker::CircuitBreaker;

/// Retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_strategy: crate::backoff::BackoffStrategy,
    pub jitter: bool,
    /// Categories this policy will retry. Defaults to
    /// [`ErrorCategory::is_retryable_by_default`].
    #[serde(default = "default_retryable_categories")]
    pub retryable_categories: HashSet<ErrorCategory>,
    /// Upper bound on retries for `permission_denied` specifically, applied
    /// on top of `max_attempts`: the caller gets one shot at a request with
    /// a freshly reauthenticated token, never an unbounded retry loop on a
    /// credential that keeps failing.
    #[serde(default = "default_max_auth_retries")]
    pub max_auth_retries: u32,
}

fn default_retryable_categories() -> HashSet<ErrorCategory> {
    [ErrorCategory::Transient, ErrorCategory::RateLimited, ErrorCategory::PermissionDenied]
        .into_iter()
        .collect()
}

fn default_max_auth_retries() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_strategy: crate::backoff::BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
            retryable_categories: default_retryable_categories(),
            max_auth_retries: default_max_auth_retries(),
        }
    }
}

impl RetryPolicy {
    pub fn conservative() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_strategy: crate::backoff::BackoffStrategy::Exponential { base: 1.5 },
            ..Self::default()
        }
    }

    pub fn aggressive() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_strategy: crate::backoff::BackoffStrategy::Exponential { base: 1.2 },
            ..Self::default()
        }
    }

    pub fn linear(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay * max_attempts.max(1),
            backoff_strategy: crate::backoff::BackoffStrategy::Linear,
            jitter: false,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let calculator =
            BackoffCalculator::new(self.backoff_strategy, self.initial_delay, self.max_delay, self.jitter);
        calculator.calculate_delay(attempt)
    }

    fn allows(&self, category: ErrorCategory) -> bool {
        self.retryable_categories.contains(&category)
    }
}

/// Implemented by crate-local errors so the executor can read a suggested
/// delay (e.g. `Retry-After` on a 429) without knowing the concrete type.
pub trait RetryHint: Categorized {
    /// Server-suggested delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn with_default_policy() -> Self {
        Self::new(RetryPolicy::default())
    }

    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryHint + std::fmt::Display + Clone,
    {
        self.execute_with_context(|_attempt| f()).await
    }

    /// Run `f`, retrying per policy. `f` receives the 1-indexed attempt
    /// number so callers can force reauthentication before attempt 2 when
    /// the prior failure was `permission_denied`.
    pub async fn execute_with_context<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryHint + std::fmt::Display + Clone,
    {
        let mut attempt = 1;
        let mut auth_retries = 0;

        loop {
            tracing::debug!(attempt, max_attempts = self.policy.max_attempts, "executing attempt");

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let category = error.category();

                    if !self.policy.allows(category) {
                        tracing::warn!(%category, %error, "non-retryable error");
                        return Err(RetryError::NonRetryableError(error));
                    }

                    if category == ErrorCategory::PermissionDenied {
                        auth_retries += 1;
                        if auth_retries > self.policy.max_auth_retries {
                            tracing::warn!(%error, "exhausted reauthentication retries");
                            return Err(RetryError::MaxAttemptsExceeded {
                                attempts: attempt,
                                last_error: error,
                            });
                        }
                    }

                    if attempt >= self.policy.max_attempts {
                        tracing::warn!(attempt, %error, "operation failed after max attempts");
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = error.retry_after().unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
                    tracing::warn!(attempt, %error, ?delay, "retrying after delay");
                    sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }

    /// Run `f` behind a circuit breaker, short-circuiting when it is open.
    /// The breaker itself decides which categories count as failures (see
    /// [`CircuitBreaker::record_failure`]); this just forwards the error's
    /// category unconditionally.
    pub async fn execute_with_circuit_breaker<F, Fut, T, E>(
        &self,
        f: F,
        circuit_breaker: &CircuitBreaker,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryHint + std::fmt::Display + Clone,
    {
        if circuit_breaker.is_open() {
            circuit_breaker.record_rejection();
            return Err(RetryError::CircuitBreakerOpen);
        }

        match self.execute(f).await {
            Ok(result) => {
                circuit_breaker.record_success();
                Ok(result)
            }
            Err(retry_error) => {
                if let Some(category) = retry_error.category() {
                    circuit_breaker.record_failure(category);
                }
                Err(retry_error)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("maximum retry attempts ({attempts}) exceeded: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },
    #[error("non-retryable error: {0}")]
    NonRetryableError(E),
    #[error("circuit breaker is open")]
    CircuitBreakerOpen,
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => Some(last_error),
            RetryError::NonRetryableError(error) => Some(error),
            RetryError::CircuitBreakerOpen => None,
        }
    }

    pub fn is_circuit_breaker_open(&self) -> bool {
        matches!(self, RetryError::CircuitBreakerOpen)
    }
}

impl<E: Categorized> RetryError<E> {
    fn category(&self) -> Option<ErrorCategory> {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => Some(last_error.category()),
            RetryError::NonRetryableError(last_error) => Some(last_error.category()),
            RetryError::CircuitBreakerOpen => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct TestError {
        category: ErrorCategory,
        message: String,
        retry_after: Option<Duration>,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Categorized for TestError {
        fn category(&self) -> ErrorCategory {
            self.category
        }
    }

    impl RetryHint for TestError {
        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn transient(message: &str) -> TestError {
        TestError {
            category: ErrorCategory::Transient,
            message: message.to_string(),
            retry_after: None,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_strategy: crate::backoff::BackoffStrategy::Fixed,
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let executor = RetryExecutor::new(fast_policy());

        let result = executor
            .execute(|| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 2 {
                        Err(transient("temporary failure"))
                    } else {
                        Ok("done".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn max_attempts_exceeded_on_persistent_transient_failure() {
        let executor = RetryExecutor::new(fast_policy());
        let result: Result<(), RetryError<TestError>> =
            executor.execute(|| async { Err(transient("always fails")) }).await;
        assert!(matches!(result.unwrap_err(), RetryError::MaxAttemptsExceeded { .. }));
    }

    #[tokio::test]
    async fn client_errors_are_never_retried() {
        let executor = RetryExecutor::with_default_policy();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| {
                attempts_clone.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(TestError {
                        category: ErrorCategory::Client,
                        message: "bad request".to_string(),
                        retry_after: None,
                    })
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), RetryError::NonRetryableError(_)));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn permission_denied_retried_at_most_once() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 10,
            ..fast_policy()
        });
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| {
                attempts_clone.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(TestError {
                        category: ErrorCategory::PermissionDenied,
                        message: "unauthorized".to_string(),
                        retry_after: None,
                    })
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), RetryError::MaxAttemptsExceeded { .. }));
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn rate_limited_honours_retry_after() {
        let executor = RetryExecutor::new(fast_policy());
        let attempt_numbers = Arc::new(std::sync::Mutex::new(Vec::new()));
        let attempt_numbers_clone = attempt_numbers.clone();

        let result = executor
            .execute_with_context(|attempt| {
                attempt_numbers_clone.lock().unwrap().push(attempt);
                async move {
                    if attempt < 2 {
                        Err(TestError {
                            category: ErrorCategory::RateLimited,
                            message: "slow down".to_string(),
                            retry_after: Some(Duration::from_millis(1)),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(*attempt_numbers.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn circuit_breaker_short_circuits_when_open() {
        let breaker = CircuitBreaker::with_defaults();
        for _ in 0..10 {
            breaker.record_failure(ErrorCategory::Transient);
        }
        let executor = RetryExecutor::new(fast_policy());

        let result: Result<(), RetryError<TestError>> =
            executor.execute_with_circuit_breaker(|| async { Ok(()) }, &breaker).await;

        assert!(result.unwrap_err().is_circuit_breaker_open());
    }
}
