//! IterationStateStore port - 状態の永続化
//!
//! One record per iteration id. Saving overwrites the whole record; the store
//! never deletes anything.

use std::io;
use std::path::PathBuf;

use crate::domain::{Classify, ErrorKind, IterationId, IterationState, IterationStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted record could not be decoded or breaks the state invariants.
    #[error("corrupt record at {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },
}

impl Classify for StoreError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            StoreError::Io(e) => e.error_kind(),
            StoreError::CorruptRecord { .. } => ErrorKind::Permanent,
        }
    }
}

/// Persists and retrieves [`IterationState`] records.
///
/// `list_*` results are sorted by id.
pub trait IterationStateStore {
    /// Insert or fully replace the record for `state.id()`.
    fn save(&self, state: &IterationState) -> Result<(), StoreError>;

    /// `Ok(None)` when no record exists for `id`.
    fn load(&self, id: &IterationId) -> Result<Option<IterationState>, StoreError>;

    /// Every record whose status is exactly `status`.
    fn list_by_status(&self, status: IterationStatus) -> Result<Vec<IterationState>, StoreError> {
        let mut states = self.list_all()?;
        states.retain(|s| s.status() == status);
        Ok(states)
    }

    fn list_all(&self) -> Result<Vec<IterationState>, StoreError>;
}

impl<S: IterationStateStore + ?Sized> IterationStateStore for &S {
    fn save(&self, state: &IterationState) -> Result<(), StoreError> {
        (**self).save(state)
    }

    fn load(&self, id: &IterationId) -> Result<Option<IterationState>, StoreError> {
        (**self).load(id)
    }

    fn list_by_status(&self, status: IterationStatus) -> Result<Vec<IterationState>, StoreError> {
        (**self).list_by_status(status)
    }

    fn list_all(&self) -> Result<Vec<IterationState>, StoreError> {
        (**self).list_all()
    }
}

impl<S: IterationStateStore + ?Sized> IterationStateStore for Box<S> {
    fn save(&self, state: &IterationState) -> Result<(), StoreError> {
        (**self).save(state)
    }

    fn load(&self, id: &IterationId) -> Result<Option<IterationState>, StoreError> {
        (**self).load(id)
    }

    fn list_by_status(&self, status: IterationStatus) -> Result<Vec<IterationState>, StoreError> {
        (**self).list_by_status(status)
    }

    fn list_all(&self) -> Result<Vec<IterationState>, StoreError> {
        (**self).list_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_records_are_permanent() {
        let err = StoreError::CorruptRecord {
            path: PathBuf::from("states/x.json"),
            reason: "expected value".into(),
        };
        assert_eq!(err.error_kind(), ErrorKind::Permanent);
        assert_eq!(err.to_string(), "corrupt record at states/x.json: expected value");
    }

    #[test]
    fn io_errors_keep_their_classification() {
        let err = StoreError::from(io::Error::new(io::ErrorKind::TimedOut, "slow disk"));
        assert_eq!(err.error_kind(), ErrorKind::Transient);

        let err = StoreError::from(io::Error::new(io::ErrorKind::PermissionDenied, "ro"));
        assert_eq!(err.error_kind(), ErrorKind::Infrastructure);
    }
}
