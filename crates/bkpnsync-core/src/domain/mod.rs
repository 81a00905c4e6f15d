//! Domain model (volumes, artifacts, outcomes, summaries, process state).
//!
//! Nothing in here spawns processes or touches the network. The types are
//! shared by the workflow, the scheduler and the health server.

pub mod artifact;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod process;
pub mod remote;
pub mod stage;
pub mod summary;
pub mod volume;

pub use artifact::ArtifactGuard;
pub use errors::{ArchiveError, HookError, RemoteError, StateError};
pub use ids::{CycleId, Id, IdMarker};
pub use outcome::{OutcomeKind, RestoreCheck, Verification, VolumeOutcome};
pub use process::{ProcessState, ProcessStatus, StateUpdate, VolumeState};
pub use remote::{DeletionFailure, RemoteRecord, RetentionPlan, RetentionReport};
pub use stage::WorkflowStage;
pub use summary::{CycleSummary, VolumeReport};
pub use volume::{Volume, archive_file_name, parse_volume_list};
