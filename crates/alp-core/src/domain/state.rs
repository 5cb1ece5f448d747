//! IterationStatus - イテレーションの状態

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of one iteration (or of a whole run, see `app::IterationTracker`).
///
/// State transitions:
/// - Pending -> Running
/// - Running -> Completed | Failed | Interrupted
///
/// Older records used a second vocabulary; those names are still accepted when
/// reading: `INITIALIZED`, `IN_PROGRESS`, `ERROR`, `TERMINATED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IterationStatus {
    /// Created, not started yet.
    #[serde(alias = "INITIALIZED")]
    Pending,

    /// Started, not finished.
    #[serde(alias = "IN_PROGRESS")]
    Running,

    /// Finished normally.
    Completed,

    /// Finished with an error (`error_details` is set).
    #[serde(alias = "ERROR")]
    Failed,

    /// Stopped before natural completion.
    #[serde(alias = "TERMINATED")]
    Interrupted,
}

impl IterationStatus {
    pub const ALL: [IterationStatus; 5] = [
        IterationStatus::Pending,
        IterationStatus::Running,
        IterationStatus::Completed,
        IterationStatus::Failed,
        IterationStatus::Interrupted,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IterationStatus::Completed | IterationStatus::Failed | IterationStatus::Interrupted
        )
    }

    /// Symbolic name as written to records and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            IterationStatus::Pending => "PENDING",
            IterationStatus::Running => "RUNNING",
            IterationStatus::Completed => "COMPLETED",
            IterationStatus::Failed => "FAILED",
            IterationStatus::Interrupted => "INTERRUPTED",
        }
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown iteration status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for IterationStatus {
    type Err = UnknownStatus;

    /// Case-insensitive; accepts the legacy names too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "PENDING" | "INITIALIZED" => Ok(IterationStatus::Pending),
            "RUNNING" | "IN_PROGRESS" | "INPROGRESS" => Ok(IterationStatus::Running),
            "COMPLETED" => Ok(IterationStatus::Completed),
            "FAILED" | "ERROR" => Ok(IterationStatus::Failed),
            "INTERRUPTED" | "TERMINATED" => Ok(IterationStatus::Interrupted),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
