//! EventSink port - イベント記録の抽象化
//!
//! The core never writes logs itself; it hands [`DomainEvent`]s to a sink.
//!
//! # 実装
//! - `NoopEventSink`: 何もしない
//! - `InMemoryEventSink`: テスト用
//! - `JsonlEventSink`: JSON lines ファイルに追記

use std::io;

use crate::domain::{Classify, DomainEvent, ErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("event sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Classify for EventSinkError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            EventSinkError::Io(e) => e.error_kind(),
            EventSinkError::Encode(_) => ErrorKind::Permanent,
        }
    }
}

/// EventSink はドメインイベントを記録
pub trait EventSink {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventSinkError>;
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventSinkError> {
        (**self).emit(event)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventSinkError> {
        (**self).emit(event)
    }
}
