//! Adapters for the ports.
//!
//! - **TarArchiver**: `tar -czpf` / `tar -xzf`
//! - **RcloneRemote**: `rclone copy` / `lsf` / `lsjson` / `deletefile`
//! - **JsonFileStateStore**: state record in a JSON file, atomic replace
//! - **InMemoryStateStore**: single-process store (tests, embedding)
//! - **SubprocessCycleRunner**: runs `bkpnsync cycle` as a child process

pub mod file_state;
pub mod memory_state;
pub mod rclone_remote;
pub mod subprocess_runner;
pub mod tar_archiver;

pub use self::file_state::JsonFileStateStore;
pub use self::memory_state::InMemoryStateStore;
pub use self::rclone_remote::RcloneRemote;
pub use self::subprocess_runner::SubprocessCycleRunner;
pub use self::tar_archiver::TarArchiver;
