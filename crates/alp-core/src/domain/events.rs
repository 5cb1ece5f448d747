//! Events - ドメインイベント
//!
//! Everything the core hands to an `EventSink`. Serialized with an `event` tag
//! so a JSON-lines log can hold all kinds side by side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorSeverity;
use super::ids::{EventId, IterationId};
use super::iteration::{Attributes, IterationState};
use super::state::IterationStatus;
use super::termination::TerminationReason;

/// DomainEvent はドメインで発生したイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A state was persisted; carries the full serialized record.
    IterationSaved { record: serde_json::Value },

    /// One finished iteration, in the flat shape used by reports.
    IterationLogged(IterationLogEntry),

    /// The loop stopped.
    Terminated(TerminationEvent),

    /// A failure was reported through `app::ErrorReporter`.
    ErrorReported(ErrorReport),
}

impl DomainEvent {
    pub fn iteration_saved(state: &IterationState) -> Self {
        DomainEvent::IterationSaved {
            record: state.to_record(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::IterationSaved { .. } => "iteration_saved",
            DomainEvent::IterationLogged(_) => "iteration_logged",
            DomainEvent::Terminated(_) => "terminated",
            DomainEvent::ErrorReported(_) => "error_reported",
        }
    }
}

/// Flat per-iteration log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLogEntry {
    /// 1-based position of the iteration within its run.
    pub iteration_number: u32,
    pub iteration_id: IterationId,
    pub status: IterationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,

    #[serde(default)]
    pub metrics: Attributes,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl IterationLogEntry {
    pub fn from_state(
        iteration_number: u32,
        state: &IterationState,
        performance: Option<f64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            iteration_number,
            iteration_id: state.id().clone(),
            status: state.status(),
            performance,
            metrics: state.metrics.clone(),
            error_details: state.error_details().map(str::to_string),
            timestamp,
        }
    }
}

/// Complete record of a loop termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationEvent {
    pub event_id: EventId,
    pub reason: TerminationReason,
    pub iteration_count: u32,
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub performance_metrics: Attributes,

    #[serde(default)]
    pub additional_context: Attributes,
}

impl TerminationEvent {
    pub fn new(
        event_id: EventId,
        reason: TerminationReason,
        iteration_count: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            reason,
            iteration_count,
            timestamp,
            performance_metrics: Attributes::new(),
            additional_context: Attributes::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.performance_metrics.insert(key.into(), value);
        self
    }

    pub fn with_context(mut self, context: Attributes) -> Self {
        self.additional_context = context;
        self
    }
}

/// ErrorReport は報告済みエラーの構造化レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,

    /// Short type name of the reported error, e.g. `Error` for `std::io::Error`.
    pub error_type: String,
    pub error_message: String,
    pub severity: ErrorSeverity,

    #[serde(default)]
    pub context: Attributes,
}
