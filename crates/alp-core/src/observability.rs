//! Observability - 状態ストアの集計ビュー

use serde::{Deserialize, Serialize};

use crate::domain::{IterationState, IterationStatus};

/// StatusCounts はステータスごとの保存済みイテレーション数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub interrupted: usize,
}

impl StatusCounts {
    pub fn from_states<'s>(states: impl IntoIterator<Item = &'s IterationState>) -> Self {
        let mut counts = Self::default();
        for state in states {
            *counts.slot(state.status()) += 1;
        }
        counts
    }

    pub fn get(&self, status: IterationStatus) -> usize {
        match status {
            IterationStatus::Pending => self.pending,
            IterationStatus::Running => self.running,
            IterationStatus::Completed => self.completed,
            IterationStatus::Failed => self.failed,
            IterationStatus::Interrupted => self.interrupted,
        }
    }

    pub fn total(&self) -> usize {
        IterationStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    fn slot(&mut self, status: IterationStatus) -> &mut usize {
        match status {
            IterationStatus::Pending => &mut self.pending,
            IterationStatus::Running => &mut self.running,
            IterationStatus::Completed => &mut self.completed,
            IterationStatus::Failed => &mut self.failed,
            IterationStatus::Interrupted => &mut self.interrupted,
        }
    }
}
