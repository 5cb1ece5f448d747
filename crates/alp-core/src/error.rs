use thiserror::Error;

use crate::app::{BuildError, LoopError};
use crate::config::ConfigError;
use crate::domain::{
    Classify, ErrorKind, InvalidIterationId, RecordError, TransitionError, UnknownStatus,
};
use crate::impls::LogReadError;
use crate::ports::{EventSinkError, StoreError};

/// Everything the library can fail with, for callers that just want `?`.
#[derive(Debug, Error)]
pub enum AlpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] EventSinkError),

    #[error(transparent)]
    LogRead(#[from] LogReadError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    InvalidId(#[from] InvalidIterationId),

    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),
}

impl Classify for AlpError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            AlpError::Store(e) | AlpError::Loop(LoopError::Store(e)) => e.error_kind(),
            AlpError::Sink(e) | AlpError::Loop(LoopError::Sink(e)) => e.error_kind(),
            AlpError::LogRead(LogReadError::Io(e)) => e.error_kind(),
            _ => ErrorKind::Permanent,
        }
    }
}
