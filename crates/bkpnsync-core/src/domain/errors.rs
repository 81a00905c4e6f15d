//! Error types of the per-volume collaborators.
//!
//! All of these stop at the volume boundary: the workflow turns them into a
//! `VolumeOutcome` and the cycle moves on.

use std::path::PathBuf;

use thiserror::Error;

use crate::exec::ExecutionError;

/// A hook script exists but did not run successfully.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook {path} failed: {source}")]
    Failed {
        path: PathBuf,
        #[source]
        source: ExecutionError,
    },

    #[error("cannot inspect hook {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Archive creation or extraction failed.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archiver command failed: {0}")]
    Command(#[from] ExecutionError),

    #[error("archive io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Transfer, listing or deletion on the remote target failed.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote command failed: {0}")]
    Command(#[from] ExecutionError),

    #[error("unexpected remote listing output: {0}")]
    Listing(#[from] serde_json::Error),
}

/// Reading or writing the process state failed.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
