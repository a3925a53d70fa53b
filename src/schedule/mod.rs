// src/schedule/mod.rs

//! Concurrent, store-backed task scheduling.
//!
//! - [`queue`] is the plain deduplicating FIFO over manual and fetched
//!   task ids.
//! - [`source`] defines the backing-store paging contract and a
//!   file-backed implementation.
//! - [`scheduler`] wraps the queue with start/stop gating, low-water
//!   background refill and deferred-deletion reconciliation.

pub mod queue;
pub mod scheduler;
pub mod source;

pub use queue::TaskQueue;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use source::{FileTaskSource, TaskSource};
