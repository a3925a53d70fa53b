// tests/scheduler_dedup.rs

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::{Duration, timeout};

use critpipe::errors::{CritpipeError, Result};
use critpipe::schedule::{Scheduler, SchedulerConfig, TaskSource};

/// Hands out scripted pages, then empty pages forever.
struct ScriptedSource {
    pages: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedSource {
    fn new(pages: &[&[&str]]) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(
                pages
                    .iter()
                    .map(|p| p.iter().map(|s| s.to_string()).collect())
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl TaskSource for ScriptedSource {
    async fn query(&self, _page_size: usize) -> Result<Vec<String>> {
        Ok(self.pages.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Fails the first query, then behaves like a scripted source.
struct FlakySource {
    failed_once: Mutex<bool>,
    inner: Arc<ScriptedSource>,
}

#[async_trait]
impl TaskSource for FlakySource {
    async fn query(&self, page_size: usize) -> Result<Vec<String>> {
        {
            let mut failed = self.failed_once.lock().unwrap();
            if !*failed {
                *failed = true;
                return Err(CritpipeError::SourceError("store unavailable".into()));
            }
        }
        self.inner.query(page_size).await
    }
}

fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        fetch_size: 10,
        fetch_threshold: 5,
        idle_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn manual_task_is_never_duplicated_by_a_fetch() {
    let source = ScriptedSource::new(&[&["X", "Y"]]);
    let sched = Scheduler::new(test_config(), source);

    sched.add_manual_task("X").await;
    // A second manual injection of the same id is a no-op too.
    sched.add_manual_task("X").await;
    assert_eq!(sched.pending_tasks().await, vec!["X"]);

    // Manual task drains first, without touching the store.
    let first = timeout(Duration::from_secs(1), sched.get_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "X");

    // The next call triggers a fetch; the store's copy of "X" must be
    // dropped by the dedup set because "X" is still dispatched.
    let second = timeout(Duration::from_secs(1), sched.get_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, "Y");

    assert!(sched.pending_tasks().await.is_empty());

    // Nothing else may surface: "X" occupied exactly one queue slot.
    let third = timeout(Duration::from_millis(100), sched.get_task()).await;
    assert!(third.is_err());
}

#[tokio::test]
async fn finished_task_can_be_refetched_exactly_once() {
    // The store keeps returning "X": page 2 arrives while "X" is finished
    // but not yet reconciled, page 3 after the deferred deletion applied.
    let source = ScriptedSource::new(&[&["X"], &["X"], &["X"]]);
    let sched = Scheduler::new(test_config(), source);

    let first = timeout(Duration::from_secs(1), sched.get_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "X");

    sched.finish_task("X").await;

    // Page 2 still sees "X" pending and absorbs nothing, but its critical
    // section applies the deferred deletion; page 3 requeues "X".
    let again = timeout(Duration::from_secs(2), sched.get_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again, "X");

    // Exactly once: no extra copy was queued along the way.
    let extra = timeout(Duration::from_millis(100), sched.get_task()).await;
    assert!(extra.is_err());
}

#[tokio::test]
async fn get_task_blocks_while_stopped_and_resumes_on_start() {
    let source = ScriptedSource::new(&[]);
    let sched = Scheduler::new(test_config(), source);

    sched.stop().await;
    assert!(!sched.is_running().await);

    sched.add_manual_task("T").await;
    // Stopping never discards queued tasks.
    assert_eq!(sched.pending_tasks().await, vec!["T"]);

    let waiter = {
        let sched = Arc::clone(&sched);
        tokio::spawn(async move { sched.get_task().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!waiter.is_finished());

    sched.start().await;
    assert!(sched.is_running().await);

    let got = timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(got, "T");
}

#[tokio::test]
async fn failed_fetch_wakes_waiters_and_is_retried() {
    let source = Arc::new(FlakySource {
        failed_once: Mutex::new(false),
        inner: ScriptedSource::new(&[&["A"]]),
    });
    let sched = Scheduler::new(test_config(), source);

    // The first fetch fails; the woken waiter retriggers a fresh one which
    // succeeds, rather than hanging on the failed fetch forever.
    let got = timeout(Duration::from_secs(2), sched.get_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, "A");
}

#[tokio::test]
async fn manual_tasks_drain_strictly_before_fetched() {
    let source = ScriptedSource::new(&[&["f1", "f2"]]);
    let sched = Scheduler::new(test_config(), source);

    // Force a fetch first so fetched tasks are already queued...
    let first = timeout(Duration::from_secs(1), sched.get_task())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, "f1");

    // ...then inject manual tasks; they jump the fetched queue.
    sched.add_manual_task("m1").await;
    sched.add_manual_task("m2").await;
    assert_eq!(sched.pending_tasks().await, vec!["m1", "m2", "f2"]);

    let order = [
        timeout(Duration::from_secs(1), sched.get_task()).await.unwrap().unwrap(),
        timeout(Duration::from_secs(1), sched.get_task()).await.unwrap().unwrap(),
        timeout(Duration::from_secs(1), sched.get_task()).await.unwrap().unwrap(),
    ];
    assert_eq!(order, ["m1", "m2", "f2"]);
}

#[tokio::test]
async fn concurrent_workers_see_each_task_once() {
    let source = ScriptedSource::new(&[&["a", "b", "c", "d", "e", "f"]]);
    let sched = Scheduler::new(test_config(), source);

    let mut workers = Vec::new();
    for _ in 0..3 {
        let sched = Arc::clone(&sched);
        workers.push(tokio::spawn(async move {
            let mut got = Vec::new();
            for _ in 0..2 {
                let task = sched.get_task().await.unwrap();
                sched.finish_task(task.clone()).await;
                got.push(task);
            }
            got
        }));
    }

    let mut all: Vec<String> = Vec::new();
    for worker in workers {
        all.extend(timeout(Duration::from_secs(2), worker).await.unwrap().unwrap());
    }
    all.sort();
    assert_eq!(all, ["a", "b", "c", "d", "e", "f"]);
}
