use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected to succeed on retry (network blips, timeouts, 5xx).
    Transient,
    /// Will never succeed regardless of retry count; consumes no budget.
    Permanent,
}

/// Error types that carry their own transient/permanent classification.
pub trait Retryable {
    fn failure_class(&self) -> FailureClass;

    fn is_transient(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }
}

/// Budget and timing knobs for one retry loop.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts allowed, including the first. Zero permits none.
    pub max_attempts: u32,
    /// First backoff cap; doubles per attempt.
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay.
    pub max_delay: Duration,
    /// Optional budget for each individual attempt. Expiry cancels that
    /// attempt only, never the loop or the caller's token.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            attempt_timeout: None,
        }
    }
}

/// What one attempt produced when it did not succeed.
#[derive(Debug)]
pub enum AttemptFailure<E> {
    Error(E),
    TimedOut(Duration),
}

/// Final outcome of an unsuccessful retry loop.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation's own final failure, unchanged.
    #[error("operation failed: {0}")]
    Inner(E),
    /// The final attempt exceeded its per-attempt budget.
    #[error("attempt {attempts} timed out after {limit:?}")]
    Timeout { attempts: u32, limit: Duration },
    /// The caller's token was cancelled between attempts.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    /// The budget permitted no attempt at all.
    #[error("retry attempts exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl<E> RetryError<E> {
    /// The operation's own error, if that is what ended the loop.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Retry loop runner: classification decides what retries, [`Backoff`]
/// decides when, [`RetryOptions`] decides how often.
pub struct RetryPolicy<E> {
    options: RetryOptions,
    backoff: Backoff,
    classify: Arc<dyn Fn(&E) -> FailureClass + Send + Sync>,
    on_retry: Option<Arc<dyn Fn(u32, &AttemptFailure<E>) + Send + Sync>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            backoff: self.backoff.clone(),
            classify: Arc::clone(&self.classify),
            on_retry: self.on_retry.as_ref().map(Arc::clone),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("options", &self.options)
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl<E> RetryPolicy<E> {
    /// Policy that treats every failure as transient, with full-jitter
    /// backoff derived from `options`.
    pub fn new(options: RetryOptions) -> Self {
        let backoff = Backoff::full_jitter(options.base_delay, options.max_delay);
        Self {
            options,
            backoff,
            classify: Arc::new(|_| FailureClass::Transient),
            on_retry: None,
        }
    }

    /// Replace the delay curve (e.g. the webhook path's fixed curve).
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the transient/permanent classifier.
    pub fn classify<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> FailureClass + Send + Sync + 'static,
    {
        self.classify = Arc::new(f);
        self
    }

    /// Observer invoked after each failed attempt that will be retried.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &AttemptFailure<E>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    /// Run `op` until success, a permanent failure, cancellation, or an
    /// exhausted budget. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.options.max_attempts == 0 {
            return Err(RetryError::Exhausted { attempts: 0 });
        }
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }
            attempt += 1;
            let outcome = match self.options.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                    Ok(result) => result.map_err(AttemptFailure::Error),
                    Err(_) => Err(AttemptFailure::TimedOut(limit)),
                },
                None => op(attempt).await.map_err(AttemptFailure::Error),
            };
            let failure = match outcome {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            let class = match &failure {
                AttemptFailure::Error(e) => (self.classify)(e),
                // Expiry of the per-attempt budget says nothing about the
                // next attempt.
                AttemptFailure::TimedOut(_) => FailureClass::Transient,
            };
            if class == FailureClass::Permanent
                || attempt >= self.options.max_attempts
                || cancel.is_cancelled()
            {
                return Err(match failure {
                    AttemptFailure::Error(e) => RetryError::Inner(e),
                    AttemptFailure::TimedOut(limit) => RetryError::Timeout {
                        attempts: attempt,
                        limit,
                    },
                });
            }
            if let Some(observer) = &self.on_retry {
                observer(attempt, &failure);
            }
            let delay = self.backoff.delay(attempt);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
            }
        }
    }
}

impl<E: Retryable> RetryPolicy<E> {
    /// Policy whose classifier is the error type's own [`Retryable`] impl.
    pub fn for_retryable(options: RetryOptions) -> Self {
        Self::new(options).classify(|e: &E| e.failure_class())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError {
        message: String,
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn failure_class(&self) -> FailureClass {
            if self.transient {
                FailureClass::Transient
            } else {
                FailureClass::Permanent
            }
        }
    }

    fn transient(message: &str) -> TestError {
        TestError {
            message: message.into(),
            transient: true,
        }
    }

    fn permanent(message: &str) -> TestError {
        TestError {
            message: message.into(),
            transient: false,
        }
    }

    fn fast_options(max_attempts: u32) -> RetryOptions {
        RetryOptions {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            attempt_timeout: None,
        }
    }

    #[tokio::test]
    async fn should_return_success_without_retrying() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(3));
        let result = policy
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TestError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_retry_transient_failures_until_success() {
        // Transient faults on attempts 1-2, success on 3: exactly 3 calls.
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(3));
        let result = policy
            .run(&CancellationToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(transient("connection reset"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_propagate_final_failure_when_budget_runs_out() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(3));
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient("still down")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            RetryError::Inner(e) => assert_eq!(e.message, "still down"),
            other => panic!("expected Inner, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_short_circuit_permanent_failure_without_sleeping() {
        let calls = AtomicU32::new(0);
        let retries = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&retries);
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(5))
            .on_retry(move |_, _| {
                observed.fetch_add(1, Ordering::SeqCst);
            });
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(permanent("malformed payload")) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(RetryError::Inner(_))));
    }

    #[tokio::test]
    async fn should_invoke_observer_once_per_retried_attempt() {
        let retries = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&retries);
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(4))
            .on_retry(move |_, _| {
                observed.fetch_add(1, Ordering::SeqCst);
            });
        let _: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| async {
                Err(transient("down"))
            })
            .await;
        // 4 attempts, the last is not retried.
        assert_eq!(retries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn should_produce_exhausted_for_zero_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(0));
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 0 })
        ));
    }

    #[tokio::test]
    async fn should_not_attempt_when_already_cancelled() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::<TestError>::for_retryable(fast_options(3));
        let result: Result<(), _> = policy
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_after_attempt_timeout() {
        let calls = AtomicU32::new(0);
        let options = RetryOptions {
            attempt_timeout: Some(Duration::from_millis(50)),
            ..fast_options(3)
        };
        let policy = RetryPolicy::<TestError>::for_retryable(options);
        let result = policy
            .run(&CancellationToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n == 1 {
                        // First attempt hangs past its budget.
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                    Ok::<_, TestError>(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_timeout_when_final_attempt_hangs() {
        let options = RetryOptions {
            attempt_timeout: Some(Duration::from_millis(50)),
            ..fast_options(2)
        };
        let policy = RetryPolicy::<TestError>::for_retryable(options);
        let result: Result<(), _> = policy
            .run(&CancellationToken::new(), |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(RetryError::Timeout { attempts: 2, .. })
        ));
    }
}
