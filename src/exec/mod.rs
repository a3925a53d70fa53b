// src/exec/mod.rs

//! Process execution layer.
//!
//! The orchestration core treats stage and worker behavior as opaque; this
//! module provides the concrete hook implementations the binary uses, all
//! built on `tokio::process::Command`:
//!
//! - [`command::CommandStage`] runs one pipeline stage as a shell command
//!   and streams its output into the stage's log file.
//! - [`command::run_task_command`] runs a per-repository worker command for
//!   a task id handed out by the scheduler.

pub mod command;

pub use command::{CommandStage, run_task_command};
