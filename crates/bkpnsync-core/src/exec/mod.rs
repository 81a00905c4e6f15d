//! CommandExecutor: the single boundary where external processes run.
//!
//! Everything that shells out (tar, rclone, hook scripts, the cycle
//! subprocess) goes through `CommandExecutor::execute`, which owns retries,
//! backoff and the logging around failed attempts.

mod retry;

pub use retry::RetryPolicy;

use std::fmt;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// A program plus its arguments. Never interpreted by a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How child output is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Child stdout/stderr are inherited and show up live in our logs.
    Streaming,
    /// Output is buffered; stdout is returned trimmed.
    Captured,
}

/// Successful command result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Trimmed stdout (always empty in streaming mode).
    pub stdout: String,
    /// Attempts it took, starting at 1.
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed after {attempts} attempt(s) (exit code {}){}", display_code(.code), display_stderr(.stderr))]
    Failed {
        command: String,
        attempts: u32,
        code: Option<i32>,
        stderr: String,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn display_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl ExecutionError {
    /// Attempts made before giving up (0 when the command never spawned).
    pub fn attempts(&self) -> u32 {
        match self {
            ExecutionError::Spawn { .. } => 0,
            ExecutionError::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Outcome of a single attempt.
enum AttemptError {
    Spawn(std::io::Error),
    Exit { code: Option<i32>, stderr: String },
}

/// Runs external commands with bounded retries and exponential backoff.
///
/// Stateless; cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `command`, retrying non-zero exits per `policy`.
    ///
    /// A command that cannot be spawned is reported immediately: a missing
    /// binary does not appear between attempts.
    pub async fn execute(
        &self,
        command: &CommandSpec,
        policy: RetryPolicy,
        mode: OutputMode,
    ) -> Result<CommandOutput, ExecutionError> {
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;
        loop {
            debug!(command = %command, attempt = attempt + 1, max_attempts, "running command");
            match run_once(command, mode).await {
                Ok(stdout) => {
                    return Ok(CommandOutput {
                        stdout,
                        attempts: attempt + 1,
                    });
                }
                Err(AttemptError::Spawn(source)) => {
                    error!(command = %command, error = %source, "failed to spawn command");
                    return Err(ExecutionError::Spawn {
                        command: command.to_string(),
                        source,
                    });
                }
                Err(AttemptError::Exit { code, stderr }) => {
                    if attempt < policy.retries {
                        let delay = policy.delay_for(attempt);
                        warn!(
                            command = %command,
                            attempt = attempt + 1,
                            max_attempts,
                            exit_code = ?code,
                            stderr = %stderr,
                            retry_in_secs = delay.as_secs_f64(),
                            "command failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    } else {
                        error!(
                            command = %command,
                            attempts = max_attempts,
                            exit_code = ?code,
                            stderr = %stderr,
                            "command failed after all attempts"
                        );
                        return Err(ExecutionError::Failed {
                            command: command.to_string(),
                            attempts: max_attempts,
                            code,
                            stderr,
                        });
                    }
                }
            }
        }
    }

    /// Streaming run: output goes straight to our stdout/stderr.
    pub async fn run(
        &self,
        command: &CommandSpec,
        policy: RetryPolicy,
    ) -> Result<(), ExecutionError> {
        self.execute(command, policy, OutputMode::Streaming)
            .await
            .map(|_| ())
    }

    /// Captured run: returns trimmed stdout.
    pub async fn capture(
        &self,
        command: &CommandSpec,
        policy: RetryPolicy,
    ) -> Result<String, ExecutionError> {
        self.execute(command, policy, OutputMode::Captured)
            .await
            .map(|out| out.stdout)
    }
}

async fn run_once(command: &CommandSpec, mode: OutputMode) -> Result<String, AttemptError> {
    let mut cmd = Command::new(command.program());
    // Own process group: a terminal Ctrl-C reaches only us, never tar/rclone mid-transfer.
    cmd.args(command.arguments())
        .stdin(Stdio::null())
        .process_group(0);

    match mode {
        OutputMode::Streaming => {
            let status = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(AttemptError::Spawn)?;
            if status.success() {
                Ok(String::new())
            } else {
                Err(AttemptError::Exit {
                    code: status.code(),
                    stderr: String::new(),
                })
            }
        }
        OutputMode::Captured => {
            let output = cmd.output().await.map_err(AttemptError::Spawn)?;
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                Err(AttemptError::Exit {
                    code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }
    }
}
