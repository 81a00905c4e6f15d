//! Long-lived process state and the typed commands that change it.
//!
//! The state outlives cycles and is the only thing the health server reads.
//! Writers never hand the store a closure: they send `StateUpdate` values and
//! the store applies them in order, computing derived values (counters) from
//! the state it just read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::outcome::OutcomeKind;
use super::summary::VolumeReport;

/// Coarse status of the whole process.
///
/// Within a cycle the status only moves forward:
/// - Starting -> Running -> Idle | Error
///
/// Between cycles Idle/Error go back to Running. Nothing returns to Starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    #[default]
    Starting,
    Running,
    Idle,
    Error,
}

impl ProcessStatus {
    /// Liveness: only an explicit error is unhealthy.
    pub fn is_healthy(self) -> bool {
        self != ProcessStatus::Error
    }

    /// Readiness: the process has finished starting and is not broken.
    pub fn is_ready(self) -> bool {
        matches!(self, ProcessStatus::Idle | ProcessStatus::Running)
    }

    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        next != ProcessStatus::Starting || self == ProcessStatus::Starting
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Idle => "idle",
            ProcessStatus::Error => "error",
        }
    }
}

/// Last known result of one volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeState {
    pub state: OutcomeKind,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl VolumeState {
    pub fn from_report(report: &VolumeReport, updated_at: DateTime<Utc>) -> Self {
        Self {
            state: report.kind(),
            size_bytes: report.size_bytes.unwrap_or(0),
            duration_seconds: report.duration.as_secs_f64(),
            checksum: report.checksum.clone(),
            reason: report.outcome.reason().map(str::to_string),
            updated_at,
        }
    }
}

/// Persisted process-wide state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessState {
    pub status: ProcessStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub current_operation: Option<String>,

    /// Completed cycles.
    pub total_backups: u64,
    /// Failed volumes plus failed cycles.
    pub total_failures: u64,

    /// Counts of the latest cycle.
    pub volumes_backed_up: u64,
    pub volumes_failed: u64,
    pub volumes_skipped: u64,

    pub last_duration: f64,
    /// End of the latest cycle without failed volumes.
    pub last_backup_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_total_size: u64,
    pub next_run: Option<DateTime<Utc>>,

    pub volumes: BTreeMap<String, VolumeState>,
}

/// A single typed change to `ProcessState`.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    SetStatus(ProcessStatus),
    SetStartTime(DateTime<Utc>),
    SetCurrentOperation(Option<String>),
    IncrementTotalCycles,
    IncrementTotalFailures(u64),
    SetCycleCounts {
        succeeded: u64,
        failed: u64,
        skipped: u64,
    },
    SetLastDuration(f64),
    SetLastSuccess(DateTime<Utc>),
    SetLastError(Option<String>),
    SetLastTotalSize(u64),
    RecordVolume {
        name: String,
        state: VolumeState,
    },
    ClearVolumes,
    SetNextRun(Option<DateTime<Utc>>),
}

impl ProcessState {
    /// Apply one update. Returns false when the update was rejected.
    pub fn apply(&mut self, update: StateUpdate) -> bool {
        match update {
            StateUpdate::SetStatus(next) => {
                if !self.status.can_transition_to(next) {
                    warn!(from = self.status.as_str(), to = next.as_str(), "rejected status transition");
                    return false;
                }
                self.status = next;
            }
            StateUpdate::SetStartTime(at) => self.start_time = Some(at),
            StateUpdate::SetCurrentOperation(op) => self.current_operation = op,
            StateUpdate::IncrementTotalCycles => self.total_backups += 1,
            StateUpdate::IncrementTotalFailures(n) => self.total_failures += n,
            StateUpdate::SetCycleCounts {
                succeeded,
                failed,
                skipped,
            } => {
                self.volumes_backed_up = succeeded;
                self.volumes_failed = failed;
                self.volumes_skipped = skipped;
            }
            StateUpdate::SetLastDuration(secs) => self.last_duration = secs,
            StateUpdate::SetLastSuccess(at) => self.last_backup_time = Some(at),
            StateUpdate::SetLastError(err) => self.last_error = err,
            StateUpdate::SetLastTotalSize(bytes) => self.last_total_size = bytes,
            StateUpdate::RecordVolume { name, state } => {
                self.volumes.insert(name, state);
            }
            StateUpdate::ClearVolumes => self.volumes.clear(),
            StateUpdate::SetNextRun(at) => self.next_run = at,
        }
        true
    }

    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = StateUpdate>) {
        for update in updates {
            self.apply(update);
        }
    }
}
