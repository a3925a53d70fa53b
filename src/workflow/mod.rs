// src/workflow/mod.rs

//! Workflow orchestration: dependency graph, build sequencing and the
//! asynchronous runner.
//!
//! - [`node`] holds the node arena and the [`StageHooks`] capability trait.
//! - [`graph`] builds adjacency/in-degree structures over arena ids.
//! - [`sequence`] computes the incremental build sequence (levels of
//!   mutually independent stages) with taint propagation and cycle
//!   detection.
//! - [`runner`] walks the sequence on a background task, with per-stage
//!   execution contexts and a stop/kill/finish control handle.

pub mod graph;
pub mod node;
pub mod runner;
pub mod sequence;

pub use graph::DepGraph;
pub use node::{GroupStage, NodeId, NodeMeta, StageHooks, Workflow};
pub use runner::{
    RunContext, StartOptions, WorkflowController, WorkflowHandle, WorkflowOutcome, start_workflow,
};
pub use sequence::compute_sequence;
