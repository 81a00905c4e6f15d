//! Ports - capability traits at the edges of the orchestration core.
//!
//! The workflow, cycle and scheduler only talk to these traits. Concrete
//! adapters live in `impls`; tests use fakes.
//!
//! - **Archiver**: builds and extracts archives (adapter: tar)
//! - **RemoteStore**: uploads, lists, stats and deletes remote files (adapter: rclone)
//! - **StateStore**: the persisted process state (adapters: JSON file, memory)
//! - **CycleRunner**: runs one backup cycle (adapters: subprocess, in-process)
//! - **Clock** / **IdGenerator**: time and ids, swappable in tests

pub mod archiver;
pub mod clock;
pub mod cycle_runner;
pub mod id_generator;
pub mod remote_store;
pub mod state_store;

pub use self::archiver::Archiver;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cycle_runner::{CycleRunError, CycleRunner};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::remote_store::RemoteStore;
pub use self::state_store::StateStore;
