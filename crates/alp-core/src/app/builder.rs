//! LoopBuilder - IterationLoop の構築とワイヤリング
//!
//! Everything except the store has a default:
//! - sink: `NoopEventSink`
//! - error notifier: none (reports still go to the sink)
//! - evaluator: `TerminationEvaluator::default()` (100 iterations, 0.95)
//! - retry: `RetryOptions::default()` with a blocking `ThreadSleeper`
//! - clock: `SystemClock`
//! - id prefix: `"iteration"`

use std::sync::Arc;

use super::error_reporter::{ErrorNotifier, ErrorReporter};
use super::iteration_loop::IterationLoop;
use super::tracker::IterationTracker;
use crate::domain::{Attributes, TerminationEvaluator};
use crate::impls::NoopEventSink;
use crate::ports::{
    Clock, EventSink, IterationStateStore, Sleeper, SystemClock, ThreadSleeper, UlidGenerator,
};
use crate::retry::{RetryExecutor, RetryOptions};

pub const DEFAULT_ID_PREFIX: &str = "iteration";

/// # 使用例
/// ```ignore
/// let mut lp = LoopBuilder::new()
///     .store(FileStateStore::new("iteration_states"))
///     .sink(JsonlEventSink::new("logs/iterations.jsonl"))
///     .evaluator(TerminationEvaluator::new(20, 0.9))
///     .build()?;
/// let summary = lp.run(|state| train(state))?;
/// ```
pub struct LoopBuilder<'a> {
    store: Option<Box<dyn IterationStateStore + 'a>>,
    sink: Box<dyn EventSink + 'a>,
    notifier: Option<Box<dyn ErrorNotifier + 'a>>,
    evaluator: TerminationEvaluator,
    retry: RetryOptions,
    sleeper: Box<dyn Sleeper + 'a>,
    clock: Arc<dyn Clock>,
    id_prefix: String,
    parameters: Attributes,
}

/// BuildError はループ構築時のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no state store configured; call `.store(..)` before `.build()`")]
    MissingStore,

    #[error("iteration id prefix must not be empty")]
    EmptyIdPrefix,
}

impl<'a> LoopBuilder<'a> {
    pub fn new() -> Self {
        Self {
            store: None,
            sink: Box::new(NoopEventSink),
            notifier: None,
            evaluator: TerminationEvaluator::default(),
            retry: RetryOptions::default(),
            sleeper: Box::new(ThreadSleeper),
            clock: Arc::new(SystemClock),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            parameters: Attributes::new(),
        }
    }

    pub fn store(mut self, store: impl IterationStateStore + 'a) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn sink(mut self, sink: impl EventSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Called for every iteration failure after it is recorded.
    pub fn notifier(mut self, notifier: impl ErrorNotifier + 'a) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn evaluator(mut self, evaluator: TerminationEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.retry = options;
        self
    }

    /// How the retry executor waits between attempts.
    pub fn sleeper(mut self, sleeper: impl Sleeper + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Iterations are named `<prefix>-<n>`.
    pub fn id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Copied into every iteration's `configuration`.
    pub fn parameters(mut self, parameters: Attributes) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn build(self) -> Result<IterationLoop<'a>, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        if self.id_prefix.is_empty() {
            return Err(BuildError::EmptyIdPrefix);
        }

        let sink: Arc<dyn EventSink + 'a> = Arc::from(self.sink);
        let reporter =
            ErrorReporter::with_parts(Arc::clone(&sink), Arc::clone(&self.clock), self.notifier);

        Ok(IterationLoop {
            store,
            sink,
            reporter,
            evaluator: self.evaluator,
            retry: RetryExecutor::with_sleeper(self.retry, self.sleeper),
            ids: UlidGenerator::new(Arc::clone(&self.clock)),
            clock: self.clock,
            id_prefix: self.id_prefix,
            parameters: self.parameters,
            tracker: IterationTracker::new(None),
        })
    }
}

impl Default for LoopBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
