//! Optional user hook scripts (global and per-volume).

use std::path::Path;

use tracing::{debug, info};

use crate::domain::HookError;
use crate::exec::{CommandExecutor, CommandSpec, RetryPolicy};

/// What happened when a hook was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookRun {
    /// No script at that path; nothing to do.
    NotFound,
    Ran,
}

/// Runs hook scripts as `{shell} {path}`. Hooks are never retried.
#[derive(Debug, Clone)]
pub struct HookRunner {
    executor: CommandExecutor,
    shell: String,
}

impl HookRunner {
    pub fn new(executor: CommandExecutor, shell: impl Into<String>) -> Self {
        Self {
            executor,
            shell: shell.into(),
        }
    }

    pub async fn run_if_present(&self, path: &Path) -> Result<HookRun, HookError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| HookError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            debug!(path = %path.display(), "no hook script");
            return Ok(HookRun::NotFound);
        }

        info!(path = %path.display(), "running hook script");
        let command = CommandSpec::new(self.shell.as_str()).arg(path.to_string_lossy());
        self.executor
            .run(&command, RetryPolicy::none())
            .await
            .map_err(|source| HookError::Failed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(HookRun::Ran)
    }
}
