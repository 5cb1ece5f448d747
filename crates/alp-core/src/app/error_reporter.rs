//! ErrorReporter - エラー報告と通知
//!
//! 失敗を [`ErrorReport`] にまとめて `EventSink` に記録し、通知先があれば
//! 渡す。通知先の失敗はログに残すだけで呼び出し元には返さない。

use std::fmt;
use std::sync::Arc;

use serde_json::json;

use crate::domain::{Attributes, DomainEvent, ErrorReport, ErrorSeverity};
use crate::ports::{Clock, EventSink, EventSinkError, IdGenerator, SystemClock, UlidGenerator};

pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

/// ErrorNotifier は報告済みエラーの通知先
///
/// Closures `Fn(&ErrorReport) -> Result<(), NotifyError>` implement it.
pub trait ErrorNotifier {
    fn notify(&self, report: &ErrorReport) -> Result<(), NotifyError>;
}

impl<F> ErrorNotifier for F
where
    F: Fn(&ErrorReport) -> Result<(), NotifyError>,
{
    fn notify(&self, report: &ErrorReport) -> Result<(), NotifyError> {
        self(report)
    }
}

pub struct ErrorReporter<'a> {
    sink: Arc<dyn EventSink + 'a>,
    clock: Arc<dyn Clock>,
    ids: UlidGenerator<Arc<dyn Clock>>,
    notifier: Option<Box<dyn ErrorNotifier + 'a>>,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(sink: impl EventSink + 'a) -> Self {
        Self::with_parts(Arc::new(sink), Arc::new(SystemClock), None)
    }

    pub(crate) fn with_parts(
        sink: Arc<dyn EventSink + 'a>,
        clock: Arc<dyn Clock>,
        notifier: Option<Box<dyn ErrorNotifier + 'a>>,
    ) -> Self {
        Self {
            sink,
            ids: UlidGenerator::new(Arc::clone(&clock)),
            clock,
            notifier,
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self.ids = UlidGenerator::new(Arc::clone(&self.clock));
        self
    }

    pub fn notifier(mut self, notifier: impl ErrorNotifier + 'a) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Record `error` and hand it to the notifier.
    ///
    /// Only a failing sink is returned as an error.
    pub fn report<E>(
        &self,
        error: &E,
        severity: ErrorSeverity,
        context: Attributes,
    ) -> Result<ErrorReport, EventSinkError>
    where
        E: fmt::Display + ?Sized,
    {
        let report = ErrorReport {
            event_id: self.ids.generate_event_id(),
            timestamp: self.clock.now(),
            error_type: type_label::<E>().to_string(),
            error_message: error.to_string(),
            severity,
            context,
        };

        match severity {
            ErrorSeverity::Low => tracing::info!(
                error_type = %report.error_type,
                %severity,
                error = %report.error_message,
                "error reported"
            ),
            ErrorSeverity::Medium => tracing::warn!(
                error_type = %report.error_type,
                %severity,
                error = %report.error_message,
                "error reported"
            ),
            ErrorSeverity::High | ErrorSeverity::Critical => tracing::error!(
                error_type = %report.error_type,
                %severity,
                error = %report.error_message,
                context = ?report.context,
                "error reported"
            ),
        }

        self.sink.emit(&DomainEvent::ErrorReported(report.clone()))?;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&report) {
                tracing::warn!(event_id = %report.event_id, error = %e, "error notification failed");
            }
        }
        Ok(report)
    }

    pub fn report_critical<E>(
        &self,
        error: &E,
        context: Attributes,
    ) -> Result<ErrorReport, EventSinkError>
    where
        E: fmt::Display + ?Sized,
    {
        self.report(error, ErrorSeverity::Critical, context)
    }

    /// Run `strategy` to recover from `error`.
    ///
    /// `Ok(true)` means recovered. A strategy that itself fails is reported
    /// with [`ErrorSeverity::High`] and counts as not recovered.
    pub fn attempt_recovery<E, R, F>(&self, error: &E, strategy: F) -> Result<bool, EventSinkError>
    where
        E: fmt::Display + ?Sized,
        R: fmt::Display,
        F: FnOnce() -> Result<bool, R>,
    {
        match strategy() {
            Ok(recovered) => {
                tracing::info!(recovered, original_error = %error, "recovery attempt finished");
                Ok(recovered)
            }
            Err(recovery_error) => {
                let mut context = Attributes::new();
                context.insert("original_error".into(), json!(error.to_string()));
                self.report(&recovery_error, ErrorSeverity::High, context)?;
                Ok(false)
            }
        }
    }
}

/// Last path segment of the type name, generics dropped.
fn type_label<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryEventSink;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("checkpoint missing")]
    struct RecoveryError;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
    }

    fn reported(sink: &InMemoryEventSink) -> Vec<ErrorReport> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::ErrorReported(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn report_emits_a_structured_event() {
        let sink = InMemoryEventSink::new();
        let reporter = ErrorReporter::new(&sink).clock(clock());
        let mut context = Attributes::new();
        context.insert("stage".into(), json!("training"));

        let error = io::Error::new(io::ErrorKind::TimedOut, "gpu timeout");
        let report = reporter
            .report(&error, ErrorSeverity::Medium, context.clone())
            .unwrap();

        assert_eq!(report.error_type, "Error");
        assert_eq!(report.error_message, "gpu timeout");
        assert_eq!(report.severity, ErrorSeverity::Medium);
        assert_eq!(report.context, context);
        assert_eq!(report.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(reported(&sink), vec![report]);
    }

    #[test]
    fn type_label_is_the_short_name() {
        assert_eq!(type_label::<io::Error>(), "Error");
        assert_eq!(type_label::<RecoveryError>(), "RecoveryError");
        assert_eq!(type_label::<Box<dyn std::error::Error>>(), "Box");
        assert_eq!(type_label::<str>(), "str");
    }

    #[test]
    fn notifier_receives_each_report() {
        let sink = InMemoryEventSink::new();
        let seen = RefCell::new(Vec::new());
        let reporter =
            ErrorReporter::new(&sink).notifier(|report: &ErrorReport| -> Result<(), NotifyError> {
                seen.borrow_mut().push(report.severity);
                Ok(())
            });

        reporter.report("disk full", ErrorSeverity::Low, Attributes::new()).unwrap();
        reporter.report_critical("node lost", Attributes::new()).unwrap();

        assert_eq!(*seen.borrow(), vec![ErrorSeverity::Low, ErrorSeverity::Critical]);
        assert_eq!(reported(&sink).len(), 2);
    }

    #[test]
    fn failing_notifier_is_not_propagated() {
        let sink = InMemoryEventSink::new();
        let reporter = ErrorReporter::new(&sink)
            .notifier(|_: &ErrorReport| -> Result<(), NotifyError> { Err("webhook down".into()) });

        let report = reporter.report("diverged", ErrorSeverity::High, Attributes::new());
        assert!(report.is_ok());
        assert_eq!(reported(&sink).len(), 1);
    }

    #[test]
    fn successful_recovery_reports_nothing() {
        let sink = InMemoryEventSink::new();
        let reporter = ErrorReporter::new(&sink);

        let recovered = reporter
            .attempt_recovery("lost state", || Ok::<_, RecoveryError>(true))
            .unwrap();
        assert!(recovered);

        let recovered = reporter
            .attempt_recovery("lost state", || Ok::<_, RecoveryError>(false))
            .unwrap();
        assert!(!recovered);
        assert!(reported(&sink).is_empty());
    }

    #[test]
    fn failed_recovery_is_reported_as_high() {
        let sink = InMemoryEventSink::new();
        let reporter = ErrorReporter::new(&sink);

        let recovered = reporter
            .attempt_recovery("lost state", || Err::<bool, _>(RecoveryError))
            .unwrap();
        assert!(!recovered);

        let reports = reported(&sink);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, ErrorSeverity::High);
        assert_eq!(reports[0].error_type, "RecoveryError");
        assert_eq!(reports[0].error_message, "checkpoint missing");
        assert_eq!(reports[0].context["original_error"], json!("lost state"));
    }
}
