//! RcloneRemote - rclone をバックエンドにした RemoteStore
//!
//! # 実装詳細
//! - upload: `rclone copy <local> <target>:<dir>`
//! - list: `rclone lsf` (ディレクトリ `foo/` は除外)
//! - size_of: `rclone lsjson --files-only` を serde で読む
//! - delete: `rclone deletefile <target>:<dir>/<file>`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::RemoteError;
use crate::exec::{CommandExecutor, CommandSpec, RetryPolicy};
use crate::ports::RemoteStore;

/// Retry budgets per operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RclonePolicies {
    upload: RetryPolicy,
    list: RetryPolicy,
    delete: RetryPolicy,
}

impl Default for RclonePolicies {
    fn default() -> Self {
        Self {
            upload: RetryPolicy::upload(),
            list: RetryPolicy::remote_metadata(),
            delete: RetryPolicy::remote_metadata(),
        }
    }
}

/// One entry of `rclone lsjson` output. Other fields are ignored.
#[derive(Debug, Deserialize)]
struct LsJsonEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Size")]
    size: i64,
}

#[derive(Debug, Clone)]
pub struct RcloneRemote {
    executor: CommandExecutor,
    target: String,
    config_path: Option<PathBuf>,
    policies: RclonePolicies,
}

impl RcloneRemote {
    /// `target` is the rclone remote name, without the trailing colon.
    pub fn new(executor: CommandExecutor, target: impl Into<String>) -> Self {
        Self {
            executor,
            target: target.into(),
            config_path: None,
            policies: RclonePolicies::default(),
        }
    }

    /// Pass `--config <path>` on every invocation.
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    fn location(&self, remote_dir: &str) -> String {
        format!("{}:{}", self.target, remote_dir.trim_end_matches('/'))
    }

    fn command(&self, subcommand: &str) -> CommandSpec {
        let cmd = CommandSpec::new("rclone");
        let cmd = match &self.config_path {
            Some(path) => cmd.arg("--config").arg(path.to_string_lossy()),
            None => cmd,
        };
        cmd.arg(subcommand)
    }

    fn upload_command(&self, local: &Path, remote_dir: &str) -> CommandSpec {
        self.command("copy")
            .arg(local.to_string_lossy())
            .arg(self.location(remote_dir))
    }

    fn list_command(&self, remote_dir: &str) -> CommandSpec {
        self.command("lsf").arg(self.location(remote_dir))
    }

    fn lsjson_command(&self, remote_dir: &str) -> CommandSpec {
        self.command("lsjson")
            .arg("--files-only")
            .arg(self.location(remote_dir))
    }

    fn delete_command(&self, remote_dir: &str, file_name: &str) -> CommandSpec {
        self.command("deletefile")
            .arg(format!("{}/{}", self.location(remote_dir), file_name))
    }
}

/// Files of an `rclone lsf` listing; directories end with `/` and are dropped.
fn parse_lsf(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .map(str::to_string)
        .collect()
}

fn size_from_lsjson(stdout: &str, file_name: &str) -> Result<Option<u64>, RemoteError> {
    if stdout.is_empty() {
        return Ok(None);
    }
    let entries: Vec<LsJsonEntry> = serde_json::from_str(stdout)?;
    Ok(entries
        .into_iter()
        .find(|e| e.name == file_name)
        .and_then(|e| u64::try_from(e.size).ok()))
}

#[async_trait]
impl RemoteStore for RcloneRemote {
    fn describe(&self, remote_dir: &str) -> String {
        self.location(remote_dir)
    }

    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), RemoteError> {
        self.executor
            .run(&self.upload_command(local, remote_dir), self.policies.upload)
            .await?;
        Ok(())
    }

    async fn list(&self, remote_dir: &str) -> Result<Vec<String>, RemoteError> {
        let stdout = self
            .executor
            .capture(&self.list_command(remote_dir), self.policies.list)
            .await?;
        Ok(parse_lsf(&stdout))
    }

    async fn size_of(&self, remote_dir: &str, file_name: &str) -> Result<Option<u64>, RemoteError> {
        let stdout = self
            .executor
            .capture(&self.lsjson_command(remote_dir), self.policies.list)
            .await?;
        size_from_lsjson(&stdout, file_name)
    }

    async fn delete(&self, remote_dir: &str, file_name: &str) -> Result<(), RemoteError> {
        self.executor
            .run(&self.delete_command(remote_dir, file_name), self.policies.delete)
            .await?;
        Ok(())
    }
}
