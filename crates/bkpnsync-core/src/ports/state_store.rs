//! StateStore port - the persisted process state.

use async_trait::async_trait;

use crate::domain::{ProcessState, StateError, StateUpdate};

/// Process-wide state shared by the scheduler, the cycle and the health server.
///
/// `apply` is a read-modify-write of the whole record: the updates are applied
/// in order to the state as currently stored and the result is written back.
/// Within one process writes are serialized; across processes the last writer
/// wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self) -> Result<ProcessState, StateError>;

    async fn apply(&self, updates: Vec<StateUpdate>) -> Result<ProcessState, StateError>;
}
