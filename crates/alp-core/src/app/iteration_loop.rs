//! IterationLoop - 学習ループの実行
//!
//! 1 パスの流れ:
//! 1. `<prefix>-<n>` を Pending で作成 → Running にして保存
//! 2. work を RetryExecutor 経由で実行
//! 3. performance を metrics に記録し Completed / Failed にして保存
//! 4. IterationLogged を emit
//! 5. TerminationEvaluator に継続可否を問い合わせる
//!
//! A failed iteration is reported through the [`ErrorReporter`] and ends the
//! loop with reason `Error`. The loop always ends with a `Terminated` event.

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use super::error_reporter::ErrorReporter;
use super::tracker::{IterationTracker, TrackerError};
use crate::domain::{
    Attributes, Classify, DomainEvent, ErrorSeverity, EventId, InvalidIterationId, IterationId,
    IterationLogEntry, IterationState, IterationStatus, TerminationDecision,
    TerminationEvaluator, TerminationEvent, TerminationReason, TransitionError,
};
use crate::ports::{
    Clock, EventSink, EventSinkError, IdGenerator, IterationStateStore, Sleeper, StoreError,
    UlidGenerator,
};
use crate::retry::RetryExecutor;

/// Metric key the work's return value is stored under.
pub const PERFORMANCE_METRIC: &str = "performance";

/// Infrastructure failure that stopped the loop.
///
/// Failures of the work itself are not errors here; they end the loop with
/// [`TerminationReason::Error`] and show up in [`LoopSummary::error`].
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] EventSinkError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    InvalidId(#[from] InvalidIterationId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub iterations: u32,
    pub best_performance: f64,
    pub last_performance: Option<f64>,
    pub reason: TerminationReason,

    /// Run-level status: Completed on a normal stop, Failed after an error.
    pub status: IterationStatus,
    pub event_id: EventId,
    pub error: Option<String>,
}

pub struct IterationLoop<'a> {
    pub(super) store: Box<dyn IterationStateStore + 'a>,
    pub(super) sink: Arc<dyn EventSink + 'a>,
    pub(super) reporter: ErrorReporter<'a>,
    pub(super) evaluator: TerminationEvaluator,
    pub(super) retry: RetryExecutor<Box<dyn Sleeper + 'a>>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) ids: UlidGenerator<Arc<dyn Clock>>,
    pub(super) id_prefix: String,
    pub(super) parameters: Attributes,
    pub(super) tracker: IterationTracker,
}

/// Outcome of a single pass.
struct Pass {
    performance: Option<f64>,
    error: Option<String>,
}

impl<'a> IterationLoop<'a> {
    pub fn evaluator(&self) -> &TerminationEvaluator {
        &self.evaluator
    }

    pub fn tracker(&self) -> &IterationTracker {
        &self.tracker
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    pub fn store(&self) -> &dyn IterationStateStore {
        self.store.as_ref()
    }

    pub fn reporter(&self) -> &ErrorReporter<'a> {
        &self.reporter
    }

    /// Drive iterations until the evaluator says stop or an iteration fails.
    ///
    /// `work` gets the Running state (it may fill `metrics`/`context`) and
    /// returns the iteration's performance. Retryable failures are retried
    /// with the configured backoff. Counters start from zero on every call.
    pub fn run<E, F>(&mut self, mut work: F) -> Result<LoopSummary, LoopError>
    where
        F: FnMut(&mut IterationState) -> Result<f64, E>,
        E: Classify + fmt::Display,
    {
        self.evaluator.reset();
        self.tracker = IterationTracker::new(None);
        self.tracker.start()?;

        tracing::info!(
            prefix = %self.id_prefix,
            max_iterations = self.evaluator.max_iterations(),
            threshold = self.evaluator.performance_threshold(),
            "starting iteration loop"
        );

        let mut last_performance = None;
        let (reason, error) = loop {
            self.tracker.next_iteration()?;
            let number = self.tracker.current_iteration();

            let pass = self.run_pass(number, &mut work)?;
            if let Some(message) = pass.error {
                break (TerminationReason::Error, Some(message));
            }

            let performance = pass.performance.unwrap_or(f64::NAN);
            last_performance = Some(performance);
            if let TerminationDecision::Terminate(reason) = self.evaluator.evaluate(performance) {
                break (reason, None);
            }
        };

        let iterations = self.tracker.current_iteration();
        match &error {
            Some(message) => self.tracker.fail(message.clone())?,
            None => self.tracker.complete()?,
        }

        let event = TerminationEvent::new(
            self.ids.generate_event_id(),
            reason,
            iterations,
            self.clock.now(),
        )
        .with_metric("best_performance", json!(self.evaluator.best_performance()))
        .with_metric("last_performance", json!(last_performance))
        .with_context(self.parameters.clone());
        let event_id = event.event_id;
        self.sink.emit(&DomainEvent::Terminated(event))?;

        tracing::info!(
            ?reason,
            iterations,
            best_performance = self.evaluator.best_performance(),
            "iteration loop terminated"
        );

        Ok(LoopSummary {
            iterations,
            best_performance: self.evaluator.best_performance(),
            last_performance,
            reason,
            status: self.tracker.status(),
            event_id,
            error,
        })
    }

    fn run_pass<E, F>(&mut self, number: u32, work: &mut F) -> Result<Pass, LoopError>
    where
        F: FnMut(&mut IterationState) -> Result<f64, E>,
        E: Classify + fmt::Display,
    {
        let id = IterationId::new(format!("{}-{number}", self.id_prefix))?;
        let mut state = IterationState::new(id).with_configuration(self.parameters.clone());

        state.mark_started_at(self.clock.now())?;
        self.persist(&state)?;

        let outcome = self.retry.run(|| work(&mut state));

        let pass = match outcome {
            Ok(performance) => {
                state
                    .metrics
                    .insert(PERFORMANCE_METRIC.to_string(), json!(performance));
                state.mark_completed_at(self.clock.now())?;
                Pass {
                    performance: Some(performance),
                    error: None,
                }
            }
            Err(err) => {
                let attempts = err.attempts();
                let kind = err.inner().error_kind();

                let mut context = Attributes::new();
                context.insert("iteration_id".into(), json!(state.id().as_str()));
                context.insert("iteration_number".into(), json!(number));
                context.insert("attempts".into(), json!(attempts));
                context.insert("error_kind".into(), json!(format!("{kind:?}")));
                self.reporter
                    .report(err.inner(), ErrorSeverity::from(kind), context)?;

                let mut message = err.into_inner().to_string();
                if message.trim().is_empty() {
                    message = format!("iteration failed after {attempts} attempt(s)");
                }
                state.mark_failed_at(message.clone(), self.clock.now())?;
                tracing::error!(iteration_id = %state.id(), attempts, error = %message, "iteration failed");
                Pass {
                    performance: None,
                    error: Some(message),
                }
            }
        };

        self.persist(&state)?;
        let entry = IterationLogEntry::from_state(number, &state, pass.performance, self.clock.now());
        self.sink.emit(&DomainEvent::IterationLogged(entry))?;

        tracing::debug!(
            iteration_id = %state.id(),
            status = %state.status(),
            performance = ?pass.performance,
            "iteration finished"
        );
        Ok(pass)
    }

    fn persist(&self, state: &IterationState) -> Result<(), LoopError> {
        self.store.save(state)?;
        self.sink.emit(&DomainEvent::iteration_saved(state))?;
        Ok(())
    }
}
