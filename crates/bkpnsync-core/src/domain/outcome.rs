//! Outcome model: the result of one volume's workflow pass.
//!
//! Every volume ends in exactly one of three outcomes, consumed uniformly by
//! the cycle summary, the state store and the metrics endpoint.

use serde::{Deserialize, Serialize};

/// Classification of a volume result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Success,
    Skipped,
    Failed,
}

impl OutcomeKind {
    /// Numeric encoding used by the `backup_volume_state` gauge.
    pub fn metric_value(self) -> i64 {
        match self {
            OutcomeKind::Failed => 0,
            OutcomeKind::Success => 1,
            OutcomeKind::Skipped => 2,
        }
    }
}

/// Outcome of one volume in one cycle.
///
/// - `Success`: archive uploaded (verification and retention are advisory).
/// - `Skipped`: the volume was deliberately not backed up (missing source,
///   failed volume prescript, sync-only mode).
/// - `Failed`: the backup was attempted and could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "lowercase")]
pub enum VolumeOutcome {
    Success,
    Skipped(String),
    Failed(String),
}

impl VolumeOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        VolumeOutcome::Skipped(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        VolumeOutcome::Failed(reason.into())
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            VolumeOutcome::Success => OutcomeKind::Success,
            VolumeOutcome::Skipped(_) => OutcomeKind::Skipped,
            VolumeOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            VolumeOutcome::Success => None,
            VolumeOutcome::Skipped(reason) | VolumeOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Result of comparing the local artifact with the remote copy.
///
/// Advisory only: no variant fails the volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verification {
    NotRun,
    Matched { size_bytes: u64 },
    SizeMismatch { local_bytes: u64, remote_bytes: u64 },
    MissingRemote,
    Unavailable { reason: String },
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verification::Matched { .. })
    }
}

/// Result of extracting the archive into a scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum RestoreCheck {
    NotRun,
    Disabled,
    Passed,
    Failed(String),
}
