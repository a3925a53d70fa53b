// src/schedule/queue.rs

use std::collections::{HashSet, VecDeque};

/// In-process FIFO of task ids with deduplication across origins.
///
/// Two queues feed the scheduler: manually injected tasks and tasks fetched
/// from the backing store. Both are guarded by one `pending` set, so a task
/// id is represented at most once while logically pending. Popping a task
/// hands it to a worker but intentionally keeps the id in `pending`; the id
/// only leaves the set via [`purge`](TaskQueue::purge), which the scheduler
/// calls inside a fetch's critical section after the worker acknowledged
/// completion (deferred deletion).
#[derive(Debug, Default)]
pub struct TaskQueue {
    manual: VecDeque<String>,
    fetched: VecDeque<String>,
    /// Ids that are queued or dispatched; membership here is what "logically
    /// pending" means.
    pending: HashSet<String>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a manually injected task. Returns false (and does nothing)
    /// when the id is already pending, in either queue or dispatched.
    pub fn push_manual(&mut self, id: String) -> bool {
        if self.pending.contains(&id) {
            return false;
        }
        self.pending.insert(id.clone());
        self.manual.push_back(id);
        true
    }

    /// Append a fetched page, skipping ids that are already pending.
    /// Returns how many new unique ids were incorporated.
    pub fn absorb_page(&mut self, page: impl IntoIterator<Item = String>) -> usize {
        let mut added = 0;
        for id in page {
            if self.pending.contains(&id) {
                continue;
            }
            self.pending.insert(id.clone());
            self.fetched.push_back(id);
            added += 1;
        }
        added
    }

    /// Pop the next manual task (manual tasks drain strictly before fetched).
    pub fn pop_manual(&mut self) -> Option<String> {
        self.manual.pop_front()
    }

    /// Pop the next fetched task.
    pub fn pop_fetched(&mut self) -> Option<String> {
        self.fetched.pop_front()
    }

    /// Remove finished ids from the pending set.
    ///
    /// Only ever called from the fetch's critical section; removing an id
    /// here is what finally allows the same id to be queued again.
    pub fn purge(&mut self, ids: impl Iterator<Item = String>) {
        for id in ids {
            self.pending.remove(&id);
        }
    }

    /// Number of fetched tasks still queued (drives the low-water refill).
    pub fn fetched_len(&self) -> usize {
        self.fetched.len()
    }

    /// Queued tasks in dispatch order: manual first, then fetched.
    pub fn snapshot(&self) -> Vec<String> {
        self.manual
            .iter()
            .chain(self.fetched.iter())
            .cloned()
            .collect()
    }

    /// Whether the id is logically pending (queued or dispatched).
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }
}
