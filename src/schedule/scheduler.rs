// src/schedule/scheduler.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use crate::config::model::SchedulerSection;
use crate::errors::Result;
use crate::schedule::queue::TaskQueue;
use crate::schedule::source::TaskSource;

/// Tuning knobs for one [`Scheduler`] instance.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Task ids requested per page from the backing store.
    pub fetch_size: usize,
    /// Refill in the background once the fetched-task count drops below this.
    pub fetch_threshold: usize,
    /// Sleep between fetch attempts when the store yields nothing new.
    pub idle_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_size: 200,
            fetch_threshold: 30,
            idle_interval: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    pub fn from_section(section: &SchedulerSection) -> Self {
        Self {
            fetch_size: section.fetch_size,
            fetch_threshold: section.fetch_threshold,
            idle_interval: section.idle_interval(),
        }
    }
}

struct SchedState {
    queue: TaskQueue,
    /// Single-flight flag: at most one background fetch at a time.
    fetch_in_flight: bool,
    stopped: bool,
}

/// Database-backed work queue handing out per-repository jobs to workers.
///
/// An explicit value owning all of its state, so independent instances can
/// coexist (the original kept this at package level, which made isolated
/// tests impossible). Construct with [`Scheduler::new`]; workers call
/// [`get_task`](Scheduler::get_task) / [`finish_task`](Scheduler::finish_task)
/// from as many tasks as they like.
///
/// Locking: `state` guards the queues, dedup set, stop gate and the
/// in-flight flag; `pending_deletion` guards the deferred-deletion list.
/// The deletion lock is only ever taken while already holding the state
/// lock, inside fetch reconciliation; `finish_task` takes it alone. Never
/// the reverse, so the two cannot deadlock.
///
/// One `Notify` serves both wait reasons (stop gate and task availability);
/// every waiter re-checks both predicates on each wake, so a start/stop
/// transition and a completed fetch use the same wakeup path.
pub struct Scheduler {
    config: SchedulerConfig,
    source: Arc<dyn TaskSource>,
    state: Mutex<SchedState>,
    pending_deletion: Mutex<Vec<String>>,
    notify: Notify,
}

impl Scheduler {
    /// Create a scheduler in the running state.
    pub fn new(config: SchedulerConfig, source: Arc<dyn TaskSource>) -> Arc<Self> {
        Arc::new(Self {
            config,
            source,
            state: Mutex::new(SchedState {
                queue: TaskQueue::new(),
                fetch_in_flight: false,
                stopped: false,
            }),
            pending_deletion: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    /// Inject a task ahead of everything fetched from the store.
    ///
    /// A no-op while the same id is still logically pending, from either
    /// origin.
    pub async fn add_manual_task(&self, id: impl Into<String>) {
        let id = id.into();
        let added = {
            let mut st = self.state.lock().await;
            st.queue.push_manual(id.clone())
        };
        if added {
            debug!(task = %id, "manual task queued");
            self.notify.notify_waiters();
        } else {
            debug!(task = %id, "manual task already pending, ignored");
        }
    }

    /// Take the next task, blocking while the scheduler is stopped or the
    /// queue is empty.
    ///
    /// Manual tasks drain strictly before fetched ones. Dropping below the
    /// refill threshold triggers a single-flight background fetch. The
    /// returned id stays in the dedup set until the completion reported via
    /// [`finish_task`](Scheduler::finish_task) is reconciled.
    pub async fn get_task(self: &Arc<Self>) -> Result<String> {
        loop {
            // Register interest before checking state so a wakeup between
            // the check and the await is not lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.state.lock().await;
                if !st.stopped {
                    if let Some(id) = st.queue.pop_manual() {
                        return Ok(id);
                    }
                    if st.queue.fetched_len() < self.config.fetch_threshold {
                        self.spawn_fetch(&mut st);
                    }
                    if let Some(id) = st.queue.pop_fetched() {
                        return Ok(id);
                    }
                }
            }

            notified.await;
        }
    }

    /// Acknowledge completion of a task.
    ///
    /// The id is not removed from the dedup set here; it goes onto the
    /// deferred-deletion list and is applied inside the next fetch's
    /// critical section. A fetch may already be mid-flight carrying another
    /// copy of the same id, and deferring the removal to that critical
    /// section keeps "finished" and "re-fetched" from interleaving into a
    /// duplicate.
    pub async fn finish_task(&self, id: impl Into<String>) {
        let id = id.into();
        debug!(task = %id, "task finished, removal deferred to next fetch");
        self.pending_deletion.lock().await.push(id);
    }

    /// Open the gate: blocked `get_task` callers resume.
    pub async fn start(&self) {
        info!("scheduler starting");
        self.state.lock().await.stopped = false;
        self.notify.notify_waiters();
    }

    /// Close the gate: `get_task` blocks until [`start`](Scheduler::start).
    /// Queued tasks are kept.
    pub async fn stop(&self) {
        info!("scheduler stopping");
        self.state.lock().await.stopped = true;
        self.notify.notify_waiters();
    }

    pub async fn is_running(&self) -> bool {
        !self.state.lock().await.stopped
    }

    /// Snapshot of queued (not yet dispatched) task ids, manual first.
    pub async fn pending_tasks(&self) -> Vec<String> {
        self.state.lock().await.queue.snapshot()
    }

    /// Kick off a background fetch unless one is already in flight.
    /// Caller holds the state lock.
    fn spawn_fetch(self: &Arc<Self>, st: &mut SchedState) {
        if st.fetch_in_flight {
            return;
        }
        st.fetch_in_flight = true;

        info!(
            threshold = self.config.fetch_threshold,
            "fetched tasks below threshold, fetching from backing store"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.fetch_until_new().await;

            this.state.lock().await.fetch_in_flight = false;
            // Wake everyone whether or not the fetch found tasks, so waiters
            // re-evaluate instead of hanging on a failed or empty fetch.
            this.notify.notify_waiters();

            if let Err(err) = result {
                error!(error = %err, "fetching tasks from backing store failed");
            }
        });
    }

    /// Page the backing store until at least one new unique id is absorbed.
    ///
    /// The page is read outside the state lock. Inside the lock, new ids are
    /// appended to the queue and dedup set, and the deferred-deletion list is
    /// drained and applied in the same critical section: this is the
    /// linearization point that keeps a finished id and a freshly fetched
    /// copy of the same id from coexisting.
    async fn fetch_until_new(&self) -> Result<()> {
        loop {
            let page = self.source.query(self.config.fetch_size).await?;

            let added = {
                let mut st = self.state.lock().await;
                let added = st.queue.absorb_page(page);

                let mut deletions = self.pending_deletion.lock().await;
                st.queue.purge(deletions.drain(..));
                added
            };

            if added == 0 {
                debug!(
                    idle_secs = self.config.idle_interval.as_secs(),
                    "store yielded no new tasks, idling before retry"
                );
                tokio::time::sleep(self.config.idle_interval).await;
            } else {
                debug!(added, "absorbed new tasks from backing store");
                self.notify.notify_waiters();
                return Ok(());
            }
        }
    }
}
