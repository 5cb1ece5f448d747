//! Backoff policy: decides the delay before the next attempt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time.
    Constant,

    /// `initial * attempt`
    Linear,

    /// `initial * 2^(attempt - 1)`
    #[default]
    Exponential,
}

impl BackoffStrategy {
    /// Scales `initial_delay` (any unit) for a 1-indexed `attempt`.
    ///
    /// `attempt = 0` is treated as 1.
    pub fn scale(self, attempt: u32, initial_delay: f64) -> f64 {
        let attempt = attempt.max(1);
        match self {
            BackoffStrategy::Constant => initial_delay,
            BackoffStrategy::Linear => initial_delay * f64::from(attempt),
            BackoffStrategy::Exponential => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                initial_delay * 2f64.powi(exponent)
            }
        }
    }
}

/// Delay in seconds before retrying after `attempt` failed.
pub fn delay(attempt: u32, initial_delay: f64, strategy: BackoffStrategy) -> f64 {
    strategy.scale(attempt, initial_delay)
}

/// Backoff policy for retried operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,

    pub strategy: BackoffStrategy,
}

impl BackoffPolicy {
    pub fn new(initial_delay: Duration, strategy: BackoffStrategy) -> Self {
        Self {
            initial_delay,
            strategy,
        }
    }

    /// Calculate the delay after `attempts` failed attempts (1-indexed).
    ///
    /// Example with initial_delay=2s:
    /// - Constant: 2s, 2s, 2s, ...
    /// - Linear: 2s, 4s, 6s, ...
    /// - Exponential: 2s, 4s, 8s, 16s, ...
    ///
    /// Values too large for a `Duration` saturate to `Duration::MAX`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let secs = self
            .strategy
            .scale(attempts, self.initial_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), BackoffStrategy::Exponential)
    }
}
