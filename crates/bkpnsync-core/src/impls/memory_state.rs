//! InMemoryStateStore - 開発・テスト用の StateStore

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ProcessState, StateError, StateUpdate};
use crate::ports::StateStore;

/// Process-local state. Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: Mutex<ProcessState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ProcessState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self) -> Result<ProcessState, StateError> {
        Ok(self.state.lock().await.clone())
    }

    async fn apply(&self, updates: Vec<StateUpdate>) -> Result<ProcessState, StateError> {
        let mut state = self.state.lock().await;
        state.apply_all(updates);
        Ok(state.clone())
    }
}
