//! Archiver port - archive creation and extraction.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::ArchiveError;

/// Builds permission-preserving compressed archives of a directory tree.
///
/// The archive format belongs to the adapter; the workflow only needs the
/// file extension to name artifacts.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// File extension without the leading dot (e.g. "tar.gz").
    fn extension(&self) -> &str;

    /// Archive `source` into the file `destination`.
    async fn create(&self, source: &Path, destination: &Path) -> Result<(), ArchiveError>;

    /// Extract `archive` into the existing directory `into`.
    async fn extract(&self, archive: &Path, into: &Path) -> Result<(), ArchiveError>;
}
