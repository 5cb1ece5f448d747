//! IterationTracker - 実行全体の進行管理
//!
//! Where [`IterationState`](crate::domain::IterationState) describes one
//! iteration, the tracker follows a whole run: how many iterations happened,
//! whether more are allowed, and how the run ended.

use crate::domain::{Attributes, IterationStatus, TerminationReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("run cannot move from {from} to {to}")]
    InvalidTransition {
        from: IterationStatus,
        to: IterationStatus,
    },

    #[error("run is {0}, not running")]
    NotRunning(IterationStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationTracker {
    current_iteration: u32,
    max_iterations: Option<u32>,
    status: IterationStatus,
    termination_reason: Option<TerminationReason>,
    error_details: Option<String>,
    metadata: Attributes,
}

impl IterationTracker {
    /// `None` means no iteration limit.
    pub fn new(max_iterations: Option<u32>) -> Self {
        Self {
            current_iteration: 0,
            max_iterations,
            status: IterationStatus::Pending,
            termination_reason: None,
            error_details: None,
            metadata: Attributes::new(),
        }
    }

    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.status != IterationStatus::Pending {
            return Err(TrackerError::InvalidTransition {
                from: self.status,
                to: IterationStatus::Running,
            });
        }
        self.status = IterationStatus::Running;
        tracing::info!(max_iterations = ?self.max_iterations, "iteration process started");
        Ok(())
    }

    /// Advance the counter. Returns `false` once the limit is reached, in
    /// which case the run is completed.
    pub fn next_iteration(&mut self) -> Result<bool, TrackerError> {
        if self.status != IterationStatus::Running {
            return Err(TrackerError::NotRunning(self.status));
        }

        self.current_iteration = self.current_iteration.saturating_add(1);
        if self
            .max_iterations
            .is_some_and(|max| self.current_iteration >= max)
        {
            self.complete()?;
            return Ok(false);
        }

        tracing::info!(iteration = self.current_iteration, "starting iteration");
        Ok(true)
    }

    pub fn complete(&mut self) -> Result<(), TrackerError> {
        self.finish(IterationStatus::Completed)?;
        tracing::info!(iterations = self.current_iteration, "iteration process completed");
        Ok(())
    }

    /// Stop early; the run ends Interrupted and keeps `reason`.
    pub fn terminate(&mut self, reason: TerminationReason) -> Result<(), TrackerError> {
        self.finish(IterationStatus::Interrupted)?;
        self.termination_reason = Some(reason);
        tracing::warn!(?reason, iterations = self.current_iteration, "iteration process terminated");
        Ok(())
    }

    pub fn fail(&mut self, details: impl Into<String>) -> Result<(), TrackerError> {
        self.finish(IterationStatus::Failed)?;
        let details = details.into();
        tracing::error!(error = %details, "iteration process failed");
        self.error_details = Some(details);
        Ok(())
    }

    fn finish(&mut self, to: IterationStatus) -> Result<(), TrackerError> {
        if self.status != IterationStatus::Running {
            return Err(TrackerError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn current_iteration(&self) -> u32 {
        self.current_iteration
    }

    pub fn max_iterations(&self) -> Option<u32> {
        self.max_iterations
    }

    pub fn status(&self) -> IterationStatus {
        self.status
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination_reason
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    pub fn is_iteration_allowed(&self) -> bool {
        self.status == IterationStatus::Running
            && self
                .max_iterations
                .is_none_or(|max| self.current_iteration < max)
    }
}

impl Default for IterationTracker {
    fn default() -> Self {
        Self::new(None)
    }
}
