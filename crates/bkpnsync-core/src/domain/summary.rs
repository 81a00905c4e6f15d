//! Per-volume reports and the per-cycle summary.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::CycleId;
use super::outcome::{OutcomeKind, RestoreCheck, Verification, VolumeOutcome};
use super::remote::RetentionReport;
use super::stage::WorkflowStage;

/// Everything the workflow learned about one volume in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport {
    pub volume: String,
    pub outcome: VolumeOutcome,

    /// Last stage that completed.
    pub stage: WorkflowStage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    pub verification: Verification,
    pub restore_check: RestoreCheck,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionReport>,

    pub duration: Duration,
}

impl VolumeReport {
    pub fn new(volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            outcome: VolumeOutcome::Success,
            stage: WorkflowStage::Pending,
            size_bytes: None,
            checksum: None,
            verification: Verification::NotRun,
            restore_check: RestoreCheck::NotRun,
            retention: None,
            duration: Duration::ZERO,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }
}

/// Aggregate of one cycle, built incrementally as volumes finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    pub reports: Vec<VolumeReport>,
    pub duration: Duration,
}

impl CycleSummary {
    pub fn new(cycle_id: CycleId, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            reports: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn record(&mut self, report: VolumeReport) {
        self.reports.push(report);
    }

    pub fn finish(&mut self, duration: Duration) {
        self.duration = duration;
    }

    fn count(&self, kind: OutcomeKind) -> usize {
        self.reports.iter().filter(|r| r.kind() == kind).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(OutcomeKind::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeKind::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeKind::Skipped)
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Bytes of all artifacts produced this cycle (uploaded or not).
    pub fn total_bytes(&self) -> u64 {
        self.reports.iter().filter_map(|r| r.size_bytes).sum()
    }

    /// Most recent failure, formatted for `last_error`.
    pub fn last_failure(&self) -> Option<String> {
        self.reports
            .iter()
            .rev()
            .find_map(|r| match &r.outcome {
                VolumeOutcome::Failed(reason) => Some(format!("{}: {}", r.volume, reason)),
                _ => None,
            })
    }
}
