//! Workflow stages of a single volume backup.

use serde::{Deserialize, Serialize};

/// Stage reached by a volume within one workflow pass.
///
/// Happy path:
/// - Pending -> SourceChecked -> Prescripted -> Archived -> Checksummed
///   -> Uploaded -> Verified -> RestoreTested -> RetentionApplied
///   -> Postscripted -> Done
///
/// Early exits (Skipped / Failed) are recorded on the outcome; the stage keeps
/// the last step that completed, which tells the reader how far the volume got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Pending,
    SourceChecked,
    Prescripted,
    Archived,
    Checksummed,
    Uploaded,
    Verified,
    RestoreTested,
    RetentionApplied,
    Postscripted,
    Done,
}

impl WorkflowStage {
    /// The stage that follows on the happy path (`Done` is a fixpoint).
    pub fn next(self) -> Self {
        match self {
            WorkflowStage::Pending => WorkflowStage::SourceChecked,
            WorkflowStage::SourceChecked => WorkflowStage::Prescripted,
            WorkflowStage::Prescripted => WorkflowStage::Archived,
            WorkflowStage::Archived => WorkflowStage::Checksummed,
            WorkflowStage::Checksummed => WorkflowStage::Uploaded,
            WorkflowStage::Uploaded => WorkflowStage::Verified,
            WorkflowStage::Verified => WorkflowStage::RestoreTested,
            WorkflowStage::RestoreTested => WorkflowStage::RetentionApplied,
            WorkflowStage::RetentionApplied => WorkflowStage::Postscripted,
            WorkflowStage::Postscripted => WorkflowStage::Done,
            WorkflowStage::Done => WorkflowStage::Done,
        }
    }

    /// Has an archive been handed to the remote store at this stage?
    pub fn is_uploaded(self) -> bool {
        self >= WorkflowStage::Uploaded
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::Pending => "pending",
            WorkflowStage::SourceChecked => "source_checked",
            WorkflowStage::Prescripted => "prescripted",
            WorkflowStage::Archived => "archived",
            WorkflowStage::Checksummed => "checksummed",
            WorkflowStage::Uploaded => "uploaded",
            WorkflowStage::Verified => "verified",
            WorkflowStage::RestoreTested => "restore_tested",
            WorkflowStage::RetentionApplied => "retention_applied",
            WorkflowStage::Postscripted => "postscripted",
            WorkflowStage::Done => "done",
        }
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
