//! Retry executor: runs a fallible operation until it succeeds, hits a
//! non-retryable error, or runs out of attempts.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use super::{RetryError, RetryOptions};
use crate::domain::Classify;
use crate::ports::{Sleeper, ThreadSleeper};

/// Error type an observer callback may return. It is logged, never propagated.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    RetryAfter(Duration),
    Exhausted,
    Abort,
}

/// Applies [`RetryOptions`] to an operation passed in as a closure.
///
/// ```ignore
/// let executor = RetryExecutor::new(RetryOptions::default());
/// let state = executor.run(|| store.load(&id))?;
/// ```
///
/// The operation runs again on every retry, so it has to be safe to repeat.
#[derive(Debug, Clone)]
pub struct RetryExecutor<S = ThreadSleeper> {
    options: RetryOptions,
    sleeper: S,
}

impl RetryExecutor<ThreadSleeper> {
    pub fn new(options: RetryOptions) -> Self {
        Self::with_sleeper(options, ThreadSleeper)
    }
}

impl Default for RetryExecutor<ThreadSleeper> {
    fn default() -> Self {
        Self::new(RetryOptions::default())
    }
}

impl<S: Sleeper> RetryExecutor<S> {
    pub fn with_sleeper(options: RetryOptions, sleeper: S) -> Self {
        Self { options, sleeper }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Run `operation`, blocking between attempts.
    pub fn run<T, E, F>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
    {
        self.run_observed(operation, |_, _| Ok(()))
    }

    /// Like [`run`](Self::run), calling `observer(attempt, &error)` after every
    /// retryable failure (the final one included).
    pub fn run_observed<T, E, F, O>(
        &self,
        mut operation: F,
        mut observer: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + fmt::Display,
        O: FnMut(u32, &E) -> Result<(), ObserverError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.next_step(attempt, &error, &mut observer) {
                Step::RetryAfter(delay) => self.sleeper.sleep(delay),
                Step::Exhausted => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: error,
                    });
                }
                Step::Abort => return Err(RetryError::Aborted { attempt, source: error }),
            }
        }
    }

    /// Async variant; waits with `tokio::time::sleep` instead of the sleeper.
    pub async fn run_async<T, E, F, Fut>(&self, operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
    {
        self.run_async_observed(operation, |_, _| Ok(())).await
    }

    pub async fn run_async_observed<T, E, F, Fut, O>(
        &self,
        mut operation: F,
        mut observer: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + fmt::Display,
        O: FnMut(u32, &E) -> Result<(), ObserverError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.next_step(attempt, &error, &mut observer) {
                Step::RetryAfter(delay) => tokio::time::sleep(delay).await,
                Step::Exhausted => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: error,
                    });
                }
                Step::Abort => return Err(RetryError::Aborted { attempt, source: error }),
            }
        }
    }

    fn next_step<E, O>(&self, attempt: u32, error: &E, observer: &mut O) -> Step
    where
        E: Classify + fmt::Display,
        O: FnMut(u32, &E) -> Result<(), ObserverError>,
    {
        let kind = error.error_kind();
        if !self.options.is_retryable(kind) {
            tracing::debug!(attempt, ?kind, %error, "non-retryable failure");
            return Step::Abort;
        }

        let max_attempts = self.options.attempt_limit();
        tracing::warn!(attempt, max_attempts, %error, "retry attempt failed");

        if let Err(observer_error) = observer(attempt, error) {
            tracing::warn!(attempt, error = %observer_error, "retry observer failed");
        }

        if attempt >= max_attempts {
            tracing::error!(attempts = attempt, %error, "all retry attempts failed");
            return Step::Exhausted;
        }

        let delay = self.options.backoff.next_delay(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(attempt, delay_ms, "waiting before retry");
        Step::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use crate::retry::{BackoffPolicy, BackoffStrategy};
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("{message}")]
    struct TestError {
        kind: ErrorKind,
        message: String,
    }

    impl TestError {
        fn transient(message: &str) -> Self {
            Self {
                kind: ErrorKind::Transient,
                message: message.to_string(),
            }
        }

        fn permanent(message: &str) -> Self {
            Self {
                kind: ErrorKind::Permanent,
                message: message.to_string(),
            }
        }
    }

    impl Classify for TestError {
        fn error_kind(&self) -> ErrorKind {
            self.kind
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        delays: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.delays.borrow_mut().push(duration);
        }
    }

    fn executor(max_attempts: u32, strategy: BackoffStrategy) -> RetryExecutor<RecordingSleeper> {
        let options = RetryOptions::new(
            max_attempts,
            BackoffPolicy::new(Duration::from_secs(1), strategy),
        );
        RetryExecutor::with_sleeper(options, RecordingSleeper::default())
    }

    #[test]
    fn success_on_first_attempt_does_not_retry() {
        let executor = executor(3, BackoffStrategy::Exponential);
        let calls = Cell::new(0);

        let result: Result<&str, RetryError<TestError>> = executor.run(|| {
            calls.set(calls.get() + 1);
            Ok("done")
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 1);
        assert!(executor.sleeper().delays.borrow().is_empty());
    }

    #[test]
    fn fails_twice_then_succeeds() {
        let executor = executor(3, BackoffStrategy::Exponential);
        let calls = Cell::new(0);

        let result = executor.run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(TestError::transient("flaky"))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
        assert_eq!(
            *executor.sleeper().delays.borrow(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn always_failing_operation_exhausts_attempts() {
        let executor = executor(2, BackoffStrategy::Constant);
        let calls = Cell::new(0);
        let original = TestError::transient("still down");

        let err = executor
            .run(|| -> Result<(), TestError> {
                calls.set(calls.get() + 1);
                Err(original.clone())
            })
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.into_inner(), original);
        // No wait after the final attempt.
        assert_eq!(*executor.sleeper().delays.borrow(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn saturated_delay_is_passed_through() {
        let options = RetryOptions::new(
            2,
            BackoffPolicy::new(Duration::MAX, BackoffStrategy::Exponential),
        );
        let executor = RetryExecutor::with_sleeper(options, RecordingSleeper::default());

        let err = executor
            .run(|| -> Result<(), TestError> { Err(TestError::transient("down")) })
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(*executor.sleeper().delays.borrow(), vec![Duration::MAX]);
    }

    #[test]
    fn non_retryable_error_propagates_immediately() {
        let executor = executor(5, BackoffStrategy::Linear);
        let calls = Cell::new(0);

        let err = executor
            .run(|| -> Result<(), TestError> {
                calls.set(calls.get() + 1);
                Err(TestError::permanent("bad input"))
            })
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, RetryError::Aborted { attempt: 1, .. }));
        assert_eq!(err.into_inner(), TestError::permanent("bad input"));
        assert!(executor.sleeper().delays.borrow().is_empty());
    }

    #[test]
    fn non_retryable_after_retryable_stops_the_loop() {
        let executor = executor(5, BackoffStrategy::Linear);
        let calls = Cell::new(0);

        let err = executor
            .run(|| -> Result<(), TestError> {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(TestError::transient("blip"))
                } else {
                    Err(TestError::permanent("corrupt"))
                }
            })
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        assert_eq!(err.attempts(), 2);
        assert!(!err.is_exhausted());
    }

    #[test]
    fn linear_strategy_delays_grow_linearly() {
        let executor = executor(4, BackoffStrategy::Linear);
        let _ = executor.run(|| -> Result<(), TestError> { Err(TestError::transient("x")) });
        assert_eq!(
            *executor.sleeper().delays.borrow(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
    }

    #[test]
    fn observer_sees_every_retryable_failure() {
        let executor = executor(3, BackoffStrategy::Constant);
        let seen = RefCell::new(Vec::new());

        let _ = executor.run_observed(
            || -> Result<(), TestError> { Err(TestError::transient("down")) },
            |attempt, error| {
                seen.borrow_mut().push((attempt, error.message.clone()));
                Ok(())
            },
        );

        assert_eq!(
            *seen.borrow(),
            vec![
                (1, "down".to_string()),
                (2, "down".to_string()),
                (3, "down".to_string())
            ]
        );
    }

    #[test]
    fn failing_observer_does_not_abort_the_loop() {
        let executor = executor(3, BackoffStrategy::Constant);
        let calls = Cell::new(0);

        let result = executor.run_observed(
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(TestError::transient("flaky"))
                } else {
                    Ok("recovered")
                }
            },
            |_, _| Err("observer exploded".into()),
        );

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn observer_is_not_called_for_non_retryable_errors() {
        let executor = executor(3, BackoffStrategy::Constant);
        let called = Cell::new(false);

        let _ = executor.run_observed(
            || -> Result<(), TestError> { Err(TestError::permanent("nope")) },
            |_, _| {
                called.set(true);
                Ok(())
            },
        );

        assert!(!called.get());
    }

    #[test]
    fn io_errors_use_their_classification() {
        let executor = executor(3, BackoffStrategy::Constant);
        let calls = Cell::new(0);

        let err = executor
            .run(|| -> Result<(), std::io::Error> {
                calls.set(calls.get() + 1);
                Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "garbled"))
            })
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert_eq!(err.into_inner().kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test(start_paused = true)]
    async fn async_retry_waits_on_tokio_time() {
        let options = RetryOptions::new(
            3,
            BackoffPolicy::new(Duration::from_secs(2), BackoffStrategy::Exponential),
        );
        let executor = RetryExecutor::new(options);
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();

        let result = executor
            .run_async(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(TestError::transient("timeout"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        // 2s after the first failure, 4s after the second.
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn async_retry_returns_original_error_when_exhausted() {
        let executor = RetryExecutor::new(RetryOptions::new(
            2,
            BackoffPolicy::new(Duration::from_millis(500), BackoffStrategy::Constant),
        ));

        let err = executor
            .run_async(|| async { Err::<(), _>(TestError::transient("gone")) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert_eq!(err.into_inner(), TestError::transient("gone"));
    }
}
