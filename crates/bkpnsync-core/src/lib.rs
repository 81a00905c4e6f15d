//! bkpnsync-core
//!
//! Core building blocks for the bkpnsync backup runtime.
//!
//! # Module layout
//! - **domain**: domain model (volumes, artifacts, outcomes, cycle summary, process state, errors)
//! - **ports**: capability traits (Archiver, RemoteStore, StateStore, CycleRunner, Clock, IdGenerator)
//! - **exec**: CommandExecutor, the only place external processes are spawned
//! - **app**: orchestration (volume workflow, backup cycle, retention, scheduler, health server)
//! - **impls**: adapters (tar, rclone, JSON state file, in-memory state, subprocess cycle runner)
//! - **config**: environment-backed settings
//! - **observability**: tracing subscriber setup

pub mod domain;
pub mod ports;
pub mod exec;
pub mod app;
pub mod impls;
pub mod config;
pub mod observability;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, Settings};
