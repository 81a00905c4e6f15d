//! RemoteStore port - the remote target archives are uploaded to.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::RemoteError;

/// Remote directory operations.
///
/// `remote_dir` is always relative to the configured target, e.g.
/// `{prefix}/{host}/{suffix}/{volume}`. Implementations own their retry
/// policies.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human readable location, used in logs.
    fn describe(&self, remote_dir: &str) -> String;

    /// Copy a local file into `remote_dir`.
    async fn upload(&self, local: &Path, remote_dir: &str) -> Result<(), RemoteError>;

    /// File names directly under `remote_dir`. A missing directory may be
    /// reported as an error or as an empty listing.
    async fn list(&self, remote_dir: &str) -> Result<Vec<String>, RemoteError>;

    /// Size of `remote_dir/file_name`, `None` when it does not exist.
    async fn size_of(&self, remote_dir: &str, file_name: &str) -> Result<Option<u64>, RemoteError>;

    /// Delete `remote_dir/file_name`.
    async fn delete(&self, remote_dir: &str, file_name: &str) -> Result<(), RemoteError>;
}
