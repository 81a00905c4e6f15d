//! Archiver backed by the `tar` binary.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::ArchiveError;
use crate::exec::{CommandExecutor, CommandSpec, RetryPolicy};
use crate::ports::Archiver;

/// gzip-compressed tarballs, permissions preserved.
#[derive(Debug, Clone, Default)]
pub struct TarArchiver {
    executor: CommandExecutor,
}

impl TarArchiver {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }

    fn create_command(source: &Path, destination: &Path) -> CommandSpec {
        let base = CommandSpec::new("tar")
            .arg("-czpf")
            .arg(destination.to_string_lossy());
        // Archive the directory by name so extraction recreates it.
        match (source.parent(), source.file_name()) {
            (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => base
                .arg("-C")
                .arg(parent.to_string_lossy())
                .arg(name.to_string_lossy()),
            _ => base.arg("-C").arg(source.to_string_lossy()).arg("."),
        }
    }

    fn extract_command(archive: &Path, into: &Path) -> CommandSpec {
        CommandSpec::new("tar")
            .arg("-xzf")
            .arg(archive.to_string_lossy())
            .arg("-C")
            .arg(into.to_string_lossy())
    }
}

#[async_trait]
impl Archiver for TarArchiver {
    fn extension(&self) -> &str {
        "tar.gz"
    }

    async fn create(&self, source: &Path, destination: &Path) -> Result<(), ArchiveError> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ArchiveError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        self.executor
            .run(&Self::create_command(source, destination), RetryPolicy::none())
            .await?;
        Ok(())
    }

    async fn extract(&self, archive: &Path, into: &Path) -> Result<(), ArchiveError> {
        self.executor
            .run(&Self::extract_command(archive, into), RetryPolicy::none())
            .await?;
        Ok(())
    }
}
