//! Retry module: backoff policy, options and the executor that applies them.

mod backoff;
mod executor;

pub use backoff::{BackoffPolicy, BackoffStrategy, delay};
pub use executor::{ObserverError, RetryExecutor};

use crate::domain::ErrorKind;

/// What to retry, how often, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,

    pub backoff: BackoffPolicy,

    /// Failure kinds worth another attempt; everything else propagates at once.
    pub retry_on: Vec<ErrorKind>,
}

impl RetryOptions {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
            retry_on: vec![ErrorKind::Transient, ErrorKind::Infrastructure],
        }
    }

    pub fn retry_on(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    pub(crate) fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, BackoffPolicy::default())
    }
}

/// Failure of a retried operation. Both variants keep the operation's own
/// error untouched; see [`RetryError::into_inner`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `source` is the last one.
    #[error("all {attempts} attempts failed: {source}")]
    Exhausted { attempts: u32, source: E },

    /// A non-retryable error stopped the loop early.
    #[error("attempt {attempt} failed with a non-retryable error: {source}")]
    Aborted { attempt: u32, source: E },
}

impl<E> RetryError<E> {
    /// The operation's original error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Aborted { source, .. } => source,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Aborted { source, .. } => source,
        }
    }

    /// How many times the operation ran.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}
