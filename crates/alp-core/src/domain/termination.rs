//! Termination - 学習ループの終了判定
//!
//! `TerminationEvaluator` is the only stateful piece: it counts evaluations and
//! remembers the best performance seen. The rules themselves are pure.

use serde::{Deserialize, Serialize};

/// TerminationReason はループが止まった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    /// The configured iteration budget was used up.
    MaxIterations,

    /// An iteration reached the performance threshold.
    PerformanceThreshold,

    /// Stopped on request.
    ManualStop,

    /// An iteration failed and the run could not go on.
    Error,

    Unknown,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationDecision {
    Continue,
    Terminate(TerminationReason),
}

impl TerminationDecision {
    pub fn should_terminate(self) -> bool {
        matches!(self, TerminationDecision::Terminate(_))
    }
}

/// Iteration-count and performance-threshold stop conditions.
///
/// Evaluation order:
/// 1. count the call
/// 2. fold `current_performance` into `best_performance`
/// 3. terminate when `iteration_count >= max_iterations`
/// 4. terminate when `current_performance >= performance_threshold`
///
/// NaN never reaches the threshold and never becomes the best performance; it
/// still counts as an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationEvaluator {
    max_iterations: u32,
    performance_threshold: f64,
    iteration_count: u32,
    best_performance: f64,
}

impl TerminationEvaluator {
    pub const DEFAULT_MAX_ITERATIONS: u32 = 100;
    pub const DEFAULT_PERFORMANCE_THRESHOLD: f64 = 0.95;

    /// `max_iterations` is expected to be at least 1 (validated by `config`).
    pub fn new(max_iterations: u32, performance_threshold: f64) -> Self {
        Self {
            max_iterations,
            performance_threshold,
            iteration_count: 0,
            best_performance: 0.0,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn performance_threshold(&self) -> f64 {
        self.performance_threshold
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn best_performance(&self) -> f64 {
        self.best_performance
    }

    pub fn evaluate(&mut self, current_performance: f64) -> TerminationDecision {
        self.iteration_count = self.iteration_count.saturating_add(1);

        if current_performance.is_nan() {
            tracing::warn!(
                iteration = self.iteration_count,
                "performance is NaN; ignored for best/threshold"
            );
        } else {
            self.best_performance = self.best_performance.max(current_performance);
        }

        if self.iteration_count >= self.max_iterations {
            TerminationDecision::Terminate(TerminationReason::MaxIterations)
        } else if current_performance >= self.performance_threshold {
            TerminationDecision::Terminate(TerminationReason::PerformanceThreshold)
        } else {
            TerminationDecision::Continue
        }
    }

    /// Clears the counters; the configured limits stay.
    pub fn reset(&mut self) {
        self.iteration_count = 0;
        self.best_performance = 0.0;
    }
}

impl Default for TerminationEvaluator {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_MAX_ITERATIONS,
            Self::DEFAULT_PERFORMANCE_THRESHOLD,
        )
    }
}
