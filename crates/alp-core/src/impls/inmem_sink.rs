//! In-memory EventSink - 外部 I/O を伴わないイベントシンク

use std::sync::Mutex;

use crate::domain::DomainEvent;
use crate::ports::{EventSink, EventSinkError};

/// NoopEventSink は何もしない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &DomainEvent) -> Result<(), EventSinkError> {
        Ok(())
    }
}

/// Collects every emitted event (テスト用).
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far, oldest first.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventSinkError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IterationId, IterationState};

    #[test]
    fn in_memory_sink_keeps_order() {
        let sink = InMemoryEventSink::new();
        let a = IterationState::new(IterationId::new("a").unwrap());
        let b = IterationState::new(IterationId::new("b").unwrap());

        sink.emit(&DomainEvent::iteration_saved(&a)).unwrap();
        sink.emit(&DomainEvent::iteration_saved(&b)).unwrap();

        assert_eq!(
            sink.events(),
            vec![DomainEvent::iteration_saved(&a), DomainEvent::iteration_saved(&b)]
        );
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let state = IterationState::new(IterationId::new("a").unwrap());
        assert!(NoopEventSink.emit(&DomainEvent::iteration_saved(&state)).is_ok());
    }
}
