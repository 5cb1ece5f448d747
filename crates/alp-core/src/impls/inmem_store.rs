//! InMemoryStateStore - テスト・組み込み用の状態ストア

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::{IterationId, IterationState};
use crate::ports::{IterationStateStore, StoreError};

/// Keeps records in a `BTreeMap`, so listings come out sorted by id.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: Mutex<BTreeMap<IterationId, IterationState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<IterationId, IterationState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl IterationStateStore for InMemoryStateStore {
    fn save(&self, state: &IterationState) -> Result<(), StoreError> {
        self.lock().insert(state.id().clone(), state.clone());
        Ok(())
    }

    fn load(&self, id: &IterationId) -> Result<Option<IterationState>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }

    fn list_all(&self) -> Result<Vec<IterationState>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }
}
