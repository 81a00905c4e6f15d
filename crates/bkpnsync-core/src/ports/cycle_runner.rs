//! CycleRunner port - runs one backup cycle for the scheduler.

use async_trait::async_trait;
use thiserror::Error;

/// A cycle that did not complete.
#[derive(Debug, Error)]
#[error("backup cycle failed: {reason}")]
pub struct CycleRunError {
    pub reason: String,
}

impl CycleRunError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Runs exactly one backup cycle and waits for it.
///
/// Volume failures are not cycle failures: `Err` means the cycle as a whole
/// could not run (bad configuration, missing volume list, crashed subprocess).
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<(), CycleRunError>;
}
