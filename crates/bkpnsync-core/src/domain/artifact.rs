//! Guaranteed cleanup of the local archive artifact.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Owns the on-disk artifact path for the duration of one workflow pass.
///
/// The guard is armed before the archiver runs so that a partially written
/// archive is removed too. `remove` is the normal exit; `Drop` covers every
/// early return and unwinding.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the artifact now. A missing file is not an error.
    pub async fn remove(mut self) {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!(path = %self.path.display(), "deleted local artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no local artifact to delete")
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to delete local artifact")
            }
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "deleted local artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to delete local artifact")
            }
        }
    }
}
