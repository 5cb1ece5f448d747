//! IterationState - イテレーションの状態と永続化形式
//!
//! 状態遷移は `mark_*` メソッド経由でのみ行い、`to_record` / `from_record` で
//! 保存用の JSON レコードと相互変換します。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::TransitionError;
use super::ids::IterationId;
use super::state::IterationStatus;

/// Free-form string keyed mapping (configuration, metrics, context).
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// IterationState は 1 イテレーション分の状態
///
/// Design:
/// - `status`, timestamps and `error_details` only change through the `mark_*`
///   methods, which reject transitions the state machine does not allow.
/// - `configuration`, `metrics` and `context` are plain data owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    #[serde(rename = "iteration_id")]
    id: IterationId,

    status: IterationStatus,

    #[serde(default, with = "timestamp")]
    start_time: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp")]
    end_time: Option<DateTime<Utc>>,

    /// Snapshot of the parameters used for this iteration.
    #[serde(default)]
    pub configuration: Attributes,

    /// Results produced by this iteration.
    #[serde(default)]
    pub metrics: Attributes,

    #[serde(default)]
    error_details: Option<String>,

    /// Free-form caller data.
    #[serde(default)]
    pub context: Attributes,
}

/// RecordError はレコードから IterationState を復元できなかったときのエラー
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("inconsistent record: {0}")]
    Inconsistent(String),
}

impl IterationState {
    pub fn new(id: IterationId) -> Self {
        Self {
            id,
            status: IterationStatus::Pending,
            start_time: None,
            end_time: None,
            configuration: Attributes::new(),
            metrics: Attributes::new(),
            error_details: None,
            context: Attributes::new(),
        }
    }

    pub fn with_configuration(mut self, configuration: Attributes) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_context(mut self, context: Attributes) -> Self {
        self.context = context;
        self
    }

    pub fn id(&self) -> &IterationId {
        &self.id
    }

    pub fn status(&self) -> IterationStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }

    /// Wall time between start and end, once both are known.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }

    pub fn mark_started(&mut self) -> Result<(), TransitionError> {
        self.mark_started_at(Utc::now())
    }

    /// Pending -> Running.
    pub fn mark_started_at(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_status(IterationStatus::Pending, IterationStatus::Running)?;
        self.status = IterationStatus::Running;
        self.start_time = Some(at);
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), TransitionError> {
        self.mark_completed_at(Utc::now())
    }

    /// Running -> Completed.
    pub fn mark_completed_at(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.finish(IterationStatus::Completed, at)
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.mark_failed_at(message, Utc::now())
    }

    /// Running -> Failed. The message becomes `error_details` and must not be blank.
    pub fn mark_failed_at(
        &mut self,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_status(IterationStatus::Running, IterationStatus::Failed)?;
        let message = message.into();
        if message.trim().is_empty() {
            return Err(TransitionError::MissingErrorDetails(self.id.clone()));
        }
        self.status = IterationStatus::Failed;
        self.end_time = Some(at);
        self.error_details = Some(message);
        Ok(())
    }

    pub fn mark_interrupted(&mut self) -> Result<(), TransitionError> {
        self.mark_interrupted_at(Utc::now())
    }

    /// Running -> Interrupted.
    pub fn mark_interrupted_at(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.finish(IterationStatus::Interrupted, at)
    }

    fn finish(&mut self, to: IterationStatus, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_status(IterationStatus::Running, to)?;
        self.status = to;
        self.end_time = Some(at);
        Ok(())
    }

    fn ensure_status(
        &self,
        expected: IterationStatus,
        to: IterationStatus,
    ) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(TransitionError::InvalidTransition {
                iteration_id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// Plain JSON object form of this state.
    pub fn to_record(&self) -> serde_json::Value {
        // Every field serializes to a JSON value; `to_value` cannot fail here.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Inverse of [`to_record`](Self::to_record); also checks the record is a
    /// state the status machine could have produced.
    pub fn from_record(record: serde_json::Value) -> Result<Self, RecordError> {
        let state: IterationState = serde_json::from_value(record)?;
        state.validate()?;
        Ok(state)
    }

    /// Checks the timestamp / error-details invariants for the current status.
    pub fn validate(&self) -> Result<(), RecordError> {
        let inconsistent = |what: &str| -> Result<(), RecordError> {
            Err(RecordError::Inconsistent(format!(
                "{} ({}): {what}",
                self.id, self.status
            )))
        };

        let started = self.start_time.is_some();
        let ended = self.end_time.is_some();
        let has_error = self
            .error_details
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());

        if self.error_details.is_some() && !has_error {
            return inconsistent("error_details is blank");
        }

        match self.status {
            IterationStatus::Pending if started || ended => {
                inconsistent("pending iteration has timestamps")
            }
            IterationStatus::Running if !started => inconsistent("running iteration without start_time"),
            IterationStatus::Running if ended => inconsistent("running iteration has end_time"),
            s if s.is_terminal() && !(started && ended) => {
                inconsistent("finished iteration needs start_time and end_time")
            }
            IterationStatus::Failed if !has_error => inconsistent("failed iteration without error_details"),
            s if s != IterationStatus::Failed && has_error => {
                inconsistent("error_details set on a non-failed iteration")
            }
            _ => Ok(()),
        }
    }
}

/// Optional timestamps as RFC 3339 strings (or null).
///
/// Naive timestamps without an offset (older records) are read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if let Ok(t) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(t.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| D::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn id(s: &str) -> IterationId {
        IterationId::new(s).unwrap()
    }

    fn t(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, secs).unwrap()
    }

    #[test]
    fn new_state_is_pending_and_empty() {
        let state = IterationState::new(id("test_001"));
        assert_eq!(state.id().as_str(), "test_001");
        assert_eq!(state.status(), IterationStatus::Pending);
        assert!(state.start_time().is_none());
        assert!(state.end_time().is_none());
        assert!(state.error_details().is_none());
    }

    #[test]
    fn mark_started_sets_running_and_start_time() {
        let mut state = IterationState::new(id("test_002"));
        state.mark_started().unwrap();
        assert_eq!(state.status(), IterationStatus::Running);
        assert!(state.start_time().is_some());
        assert!(state.end_time().is_none());
    }

    #[test]
    fn mark_completed_sets_end_time() {
        let mut state = IterationState::new(id("test_003"));
        state.mark_started_at(t(0)).unwrap();
        state.mark_completed_at(t(5)).unwrap();
        assert_eq!(state.status(), IterationStatus::Completed);
        assert_eq!(state.end_time(), Some(t(5)));
        assert_eq!(state.elapsed(), Some(chrono::Duration::seconds(5)));
    }

    #[test]
    fn mark_failed_records_error_details() {
        let mut state = IterationState::new(id("test_004"));
        state.mark_started().unwrap();
        state.mark_failed("x").unwrap();
        assert_eq!(state.status(), IterationStatus::Failed);
        assert!(state.end_time().is_some());
        assert_eq!(state.error_details(), Some("x"));
    }

    #[test]
    fn mark_failed_rejects_blank_message() {
        let mut state = IterationState::new(id("test_005"));
        state.mark_started().unwrap();
        let err = state.mark_failed("  ").unwrap_err();
        assert_eq!(err, TransitionError::MissingErrorDetails(id("test_005")));
        assert_eq!(state.status(), IterationStatus::Running);
        assert!(state.end_time().is_none());
    }

    #[test]
    fn mark_interrupted_from_running() {
        let mut state = IterationState::new(id("test_006"));
        state.mark_started().unwrap();
        state.mark_interrupted().unwrap();
        assert_eq!(state.status(), IterationStatus::Interrupted);
        assert!(state.end_time().is_some());
    }

    #[test]
    fn transitions_from_pending_other_than_start_are_rejected() {
        let mut state = IterationState::new(id("p"));
        assert!(state.mark_completed().is_err());
        assert!(state.mark_failed("boom").is_err());
        assert!(state.mark_interrupted().is_err());
        assert_eq!(state.status(), IterationStatus::Pending);
        assert!(state.end_time().is_none());
    }

    #[test]
    fn terminal_state_rejects_further_transitions() {
        let mut state = IterationState::new(id("done"));
        state.mark_started_at(t(0)).unwrap();
        state.mark_completed_at(t(1)).unwrap();

        let err = state.mark_failed_at("late", t(2)).unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                iteration_id: id("done"),
                from: IterationStatus::Completed,
                to: IterationStatus::Failed,
            }
        );
        assert!(state.mark_started_at(t(3)).is_err());
        assert!(state.mark_interrupted_at(t(3)).is_err());

        // Nothing changed.
        assert_eq!(state.status(), IterationStatus::Completed);
        assert_eq!(state.start_time(), Some(t(0)));
        assert_eq!(state.end_time(), Some(t(1)));
        assert!(state.error_details().is_none());
    }

    #[test]
    fn start_time_is_set_only_once() {
        let mut state = IterationState::new(id("once"));
        state.mark_started_at(t(0)).unwrap();
        assert!(state.mark_started_at(t(9)).is_err());
        assert_eq!(state.start_time(), Some(t(0)));
    }

    #[test]
    fn to_record_uses_symbolic_status_and_iso_timestamps() {
        let mut state = IterationState::new(id("rec"));
        state.mark_started_at(t(0)).unwrap();

        let record = state.to_record();
        assert_eq!(record["iteration_id"], "rec");
        assert_eq!(record["status"], "RUNNING");
        assert_eq!(record["start_time"], "2024-01-01T12:00:00Z");
        assert_eq!(record["end_time"], serde_json::Value::Null);
        assert_eq!(record["error_details"], serde_json::Value::Null);
        assert!(record["configuration"].is_object());
    }

    #[test]
    fn record_roundtrip_preserves_every_field() {
        let mut state = IterationState::new(id("roundtrip"))
            .with_configuration(
                json!({"learning_rate": 0.01, "layers": [64, 32]})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .with_context(json!({"seed": 7, "tags": {"a": "b"}}).as_object().cloned().unwrap());
        state.metrics.insert("accuracy".into(), json!(0.95));
        state
            .mark_started_at(Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap())
            .unwrap();
        state.mark_failed("diverged").unwrap();

        let back = IterationState::from_record(state.to_record()).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn from_record_reads_legacy_status_and_naive_timestamps() {
        let record = json!({
            "iteration_id": "legacy",
            "status": "IN_PROGRESS",
            "start_time": "2024-03-01T10:15:30.250000",
            "end_time": null,
            "configuration": {},
            "metrics": {},
            "error_details": null,
            "context": {}
        });
        let state = IterationState::from_record(record).unwrap();
        assert_eq!(state.status(), IterationStatus::Running);
        assert_eq!(
            state.start_time(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 30).unwrap()
                + chrono::Duration::milliseconds(250))
        );
    }

    #[test]
    fn from_record_rejects_inconsistent_records() {
        let failed_without_details = json!({
            "iteration_id": "bad",
            "status": "FAILED",
            "start_time": "2024-01-01T12:00:00Z",
            "end_time": "2024-01-01T12:00:01Z",
            "error_details": null
        });
        assert!(matches!(
            IterationState::from_record(failed_without_details),
            Err(RecordError::Inconsistent(_))
        ));

        let completed_with_details = json!({
            "iteration_id": "bad",
            "status": "COMPLETED",
            "start_time": "2024-01-01T12:00:00Z",
            "end_time": "2024-01-01T12:00:01Z",
            "error_details": "should not be here"
        });
        assert!(matches!(
            IterationState::from_record(completed_with_details),
            Err(RecordError::Inconsistent(_))
        ));

        let pending_with_start = json!({
            "iteration_id": "bad",
            "status": "PENDING",
            "start_time": "2024-01-01T12:00:00Z"
        });
        assert!(IterationState::from_record(pending_with_start).is_err());
    }

    #[test]
    fn from_record_rejects_malformed_records() {
        assert!(matches!(
            IterationState::from_record(json!({"status": "PENDING"})),
            Err(RecordError::Malformed(_))
        ));
        assert!(matches!(
            IterationState::from_record(json!({"iteration_id": "x", "status": "SLEEPING"})),
            Err(RecordError::Malformed(_))
        ));
        assert!(IterationState::from_record(json!([1, 2, 3])).is_err());
    }
}
