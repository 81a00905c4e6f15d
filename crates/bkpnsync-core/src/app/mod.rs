//! Orchestration: what runs, in which order, and what gets recorded.
//!
//! - **workflow**: one volume, stage by stage, failure-isolated
//! - **cycle**: one pass over the volume list
//! - **retention**: which remote archives to keep
//! - **scheduler**: daily wakeup, subprocess cycles, graceful shutdown
//! - **health** / **metrics**: read-only HTTP view of the state
//! - **builder**: wiring from `Settings`

pub mod builder;
pub mod checksum;
pub mod cycle;
pub mod health;
pub mod hooks;
pub mod metrics;
pub mod retention;
pub mod scheduler;
pub mod shutdown;
pub mod workflow;

pub use self::builder::AppBuilder;
pub use self::cycle::{BackupCycle, CycleError, CycleOptions};
pub use self::health::HealthState;
pub use self::hooks::{HookRun, HookRunner};
pub use self::retention::{RetentionPolicy, parse_backup_date};
pub use self::scheduler::{
    Scheduler, SchedulerError, SchedulerExit, SchedulerOptions, next_run_after,
};
pub use self::shutdown::{ShutdownController, SignalAction};
pub use self::workflow::{VolumeBackupWorkflow, WorkflowOptions};
