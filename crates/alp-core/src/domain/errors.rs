//! Errors - エラー型と分類
//!
//! `ErrorKind` is the operational classification the retry executor uses to
//! decide whether a failure is worth another attempt.

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::IterationId;
use super::state::IterationStatus;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（disk, network などの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// ErrorSeverity はエラー報告の重大度
///
/// - Low: 記録のみ
/// - Medium: 一時的な失敗（リトライ後も失敗）
/// - High: 恒久的な失敗、リカバリの失敗
/// - Critical: インフラ障害など、人の介入が必要なもの
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Low => "LOW",
            ErrorSeverity::Medium => "MEDIUM",
            ErrorSeverity::High => "HIGH",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }
}

impl From<ErrorKind> for ErrorSeverity {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Transient => ErrorSeverity::Medium,
            ErrorKind::Permanent => ErrorSeverity::High,
            ErrorKind::Infrastructure => ErrorSeverity::Critical,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error severity: {0}")]
pub struct UnknownSeverity(pub String);

impl FromStr for ErrorSeverity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(ErrorSeverity::Low),
            "MEDIUM" => Ok(ErrorSeverity::Medium),
            "HIGH" => Ok(ErrorSeverity::High),
            "CRITICAL" => Ok(ErrorSeverity::Critical),
            _ => Err(UnknownSeverity(s.to_string())),
        }
    }
}

/// Failure types that can tell the retry executor what kind they are.
pub trait Classify {
    fn error_kind(&self) -> ErrorKind;
}

impl Classify for io::Error {
    fn error_kind(&self) -> ErrorKind {
        match self.kind() {
            io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe => ErrorKind::Transient,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Permanent,
            _ => ErrorKind::Infrastructure,
        }
    }
}

impl Classify for ErrorKind {
    fn error_kind(&self) -> ErrorKind {
        *self
    }
}

/// Rejected iteration state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("iteration {iteration_id}: cannot transition from {from} to {to}")]
    InvalidTransition {
        iteration_id: IterationId,
        from: IterationStatus,
        to: IterationStatus,
    },

    #[error("iteration {0}: a failed iteration needs non-empty error details")]
    MissingErrorDetails(IterationId),
}
