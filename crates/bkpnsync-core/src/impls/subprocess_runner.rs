//! SubprocessCycleRunner - 1 サイクルを子プロセスとして実行する
//!
//! A crash or leak inside a cycle cannot take the scheduler down with it.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::exec::{CommandExecutor, CommandSpec, RetryPolicy};
use crate::ports::{CycleRunError, CycleRunner};

/// Runs `<program> cycle` and waits for it. Output is streamed.
#[derive(Debug, Clone)]
pub struct SubprocessCycleRunner {
    executor: CommandExecutor,
    program: PathBuf,
    subcommand: &'static str,
}

impl SubprocessCycleRunner {
    pub fn new(executor: CommandExecutor, program: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            program: program.into(),
            subcommand: "cycle",
        }
    }

    /// Runner re-executing the current binary.
    pub fn current_exe(executor: CommandExecutor) -> std::io::Result<Self> {
        Ok(Self::new(executor, std::env::current_exe()?))
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.program.to_string_lossy()).arg(self.subcommand)
    }
}

#[async_trait]
impl CycleRunner for SubprocessCycleRunner {
    async fn run_cycle(&self) -> Result<(), CycleRunError> {
        let command = self.command();
        info!(command = %command, "starting backup cycle subprocess");
        self.executor
            .run(&command, RetryPolicy::none())
            .await
            .map_err(|e| CycleRunError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_appends_cycle_subcommand() {
        let r = SubprocessCycleRunner::new(CommandExecutor::new(), "/usr/local/bin/bkpnsync");
        assert_eq!(r.command().to_string(), "/usr/local/bin/bkpnsync cycle");
    }

    #[tokio::test]
    async fn non_zero_exit_is_cycle_error() {
        let r = SubprocessCycleRunner::new(CommandExecutor::new(), "false");
        let err = r.run_cycle().await.unwrap_err();
        assert!(err.to_string().contains("backup cycle failed"));
    }

    #[tokio::test]
    async fn zero_exit_is_ok() {
        let r = SubprocessCycleRunner::new(CommandExecutor::new(), "true");
        r.run_cycle().await.unwrap();
    }
}
