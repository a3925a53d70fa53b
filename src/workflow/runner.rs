// src/workflow/runner.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::errors::{CritpipeError, Result};
use crate::workflow::node::{NodeId, NodeMeta, Workflow};
use crate::workflow::sequence::compute_sequence;

/// Derives the per-stage log file name from its metadata.
pub type LogFileNameFn = Box<dyn Fn(&NodeMeta) -> String + Send + Sync>;

/// Optional per-stage argument resolver; overrides the stage's default args.
pub type ArgsFn = Box<dyn Fn(&NodeMeta) -> serde_json::Value + Send + Sync>;

/// Options for one workflow run.
pub struct StartOptions {
    /// Directory where per-stage logs are written; created if absent.
    pub output_dir: PathBuf,
    /// Required; runs without a naming function are rejected synchronously.
    pub log_file_name: Option<LogFileNameFn>,
    pub args_for: Option<ArgsFn>,
    pub round_id: u64,
    /// Staleness assumed for stages without their own predicate.
    pub default_needs_update: bool,
}

/// Terminal status of a workflow run.
///
/// Every run produces exactly one of these, on every exit path; a caller
/// blocked in [`WorkflowHandle::wait`] never hangs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// All scheduled stages ran to completion.
    Completed,
    /// A stage failed, or the sequence could not be computed (e.g. a
    /// dependency cycle); remaining stages were not executed.
    Failed(String),
    /// A graceful stop was requested; the current stage completed first.
    Stopped,
    /// A kill was requested; scheduling halted after the in-flight stage.
    Killed,
}

#[derive(Default)]
struct RunSignals {
    stop: AtomicBool,
    kill: AtomicBool,
}

/// Clonable control half of a run: request stop/kill without consuming the
/// handle (so e.g. a Ctrl-C task can hold it while `wait` is pending).
#[derive(Clone)]
pub struct WorkflowController {
    signals: Arc<RunSignals>,
}

impl WorkflowController {
    /// Request a graceful halt after the currently executing stage.
    pub fn stop(&self) {
        self.signals.stop.store(true, Ordering::SeqCst);
    }

    /// Halt scheduling as soon as possible. The in-flight stage is never
    /// preempted; cooperative hooks can poll [`RunContext::kill_requested`].
    pub fn kill(&self) {
        self.signals.kill.store(true, Ordering::SeqCst);
        self.signals.stop.store(true, Ordering::SeqCst);
    }
}

/// Handle returned by [`start_workflow`]; owns the terminal status channel.
pub struct WorkflowHandle {
    controller: WorkflowController,
    finish: oneshot::Receiver<WorkflowOutcome>,
}

impl std::fmt::Debug for WorkflowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowHandle").finish_non_exhaustive()
    }
}

impl WorkflowHandle {
    pub fn controller(&self) -> WorkflowController {
        self.controller.clone()
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn kill(&self) {
        self.controller.kill();
    }

    /// Wait for the run's terminal status.
    pub async fn wait(self) -> WorkflowOutcome {
        // The runner task sends on every exit path; a closed channel can
        // only mean the runtime tore the task down mid-run.
        self.finish
            .await
            .unwrap_or_else(|_| WorkflowOutcome::Failed("workflow task was aborted".into()))
    }
}

/// Per-(stage, run) execution context handed to the stage hooks.
///
/// Owns the stage's log sink (append mode, create if absent); the file is
/// closed when the context is dropped after teardown. The core never
/// formats, rotates or truncates these logs.
pub struct RunContext {
    log: tokio::fs::File,
    pub meta: NodeMeta,
    pub args: serde_json::Value,
    pub round_id: u64,
    signals: Arc<RunSignals>,
}

impl RunContext {
    /// Append one line to the stage's log file.
    ///
    /// Flushed per line; stage output is tail-followed while a round runs,
    /// so buffering whole pages would defeat the point.
    pub async fn write_log(&mut self, line: &str) -> Result<()> {
        self.log.write_all(line.as_bytes()).await?;
        self.log.write_all(b"\n").await?;
        self.log.flush().await?;
        Ok(())
    }

    /// True once a graceful stop was requested for this run.
    pub fn stop_requested(&self) -> bool {
        self.signals.stop.load(Ordering::SeqCst)
    }

    /// True once a kill was requested for this run.
    pub fn kill_requested(&self) -> bool {
        self.signals.kill.load(Ordering::SeqCst)
    }
}

/// Start a workflow run from `root`.
///
/// Option validation (missing naming function, uncreatable output
/// directory) fails synchronously before anything is spawned. On success the
/// run proceeds on a background task and the returned handle reports the
/// terminal status.
pub fn start_workflow(
    workflow: Arc<Workflow>,
    root: NodeId,
    opts: StartOptions,
) -> Result<WorkflowHandle> {
    if opts.output_dir.as_os_str().is_empty() {
        return Err(CritpipeError::InvalidStartOptions(
            "output_dir must not be empty".into(),
        ));
    }
    if opts.log_file_name.is_none() {
        return Err(CritpipeError::InvalidStartOptions(
            "log file naming function is required".into(),
        ));
    }
    std::fs::create_dir_all(&opts.output_dir)?;

    let signals = Arc::new(RunSignals::default());
    let controller = WorkflowController {
        signals: Arc::clone(&signals),
    };
    let (finish_tx, finish_rx) = oneshot::channel();

    tokio::spawn(async move {
        let outcome = run_levels(&workflow, root, &opts, &signals).await;
        match &outcome {
            WorkflowOutcome::Completed => {
                info!(root = %workflow.meta(root).name, "workflow finished")
            }
            WorkflowOutcome::Failed(reason) => {
                error!(root = %workflow.meta(root).name, %reason, "workflow failed")
            }
            WorkflowOutcome::Stopped => {
                info!(root = %workflow.meta(root).name, "workflow stopped")
            }
            WorkflowOutcome::Killed => {
                warn!(root = %workflow.meta(root).name, "workflow killed")
            }
        }
        let _ = finish_tx.send(outcome);
    });

    Ok(WorkflowHandle {
        controller,
        finish: finish_rx,
    })
}

async fn run_levels(
    workflow: &Workflow,
    root: NodeId,
    opts: &StartOptions,
    signals: &Arc<RunSignals>,
) -> WorkflowOutcome {
    let sequence = match compute_sequence(workflow, root, opts.default_needs_update) {
        Ok(seq) => seq,
        Err(err) => return WorkflowOutcome::Failed(err.to_string()),
    };

    info!(
        root = %workflow.meta(root).name,
        round = opts.round_id,
        levels = sequence.len(),
        "starting workflow"
    );
    for (i, level) in sequence.iter().enumerate() {
        let names: Vec<&str> = level
            .iter()
            .map(|id| workflow.meta(*id).name.as_str())
            .collect();
        info!(level = i, stages = ?names, "planned level");
    }

    for level in &sequence {
        for &node in level {
            let meta = workflow.meta(node);
            let hooks = workflow.hooks(node);

            if hooks.is_passive() {
                info!(stage = %meta.name, "skipping passive stage");
                continue;
            }

            let mut ctx = match new_run_context(workflow, node, opts, signals).await {
                Ok(ctx) => ctx,
                Err(err) => {
                    error!(stage = %meta.name, error = %err, "failed to create stage context");
                    return WorkflowOutcome::Failed(err.to_string());
                }
            };

            let mut result = hooks.setup(&mut ctx).await;
            if result.is_ok() {
                result = hooks.run(&mut ctx).await;
            }
            // Teardown always runs and observes the main action's result;
            // its own error only surfaces when the main action succeeded.
            let teardown_result = hooks.teardown(&mut ctx, &result).await;
            let result = result.and(teardown_result);

            if signals.kill.load(Ordering::SeqCst) {
                warn!(stage = %meta.name, "kill requested, abandoning workflow");
                return WorkflowOutcome::Killed;
            }
            if signals.stop.load(Ordering::SeqCst) {
                info!(stage = %meta.name, "stop requested, halting after current stage");
                return WorkflowOutcome::Stopped;
            }

            if let Err(err) = result {
                error!(stage = %meta.name, error = %err, "stage failed, aborting workflow");
                return WorkflowOutcome::Failed(err.to_string());
            }
        }
    }

    WorkflowOutcome::Completed
}

async fn new_run_context(
    workflow: &Workflow,
    node: NodeId,
    opts: &StartOptions,
    signals: &Arc<RunSignals>,
) -> Result<RunContext> {
    let meta = workflow.meta(node);

    // Validated non-None in start_workflow.
    let name_fn = opts
        .log_file_name
        .as_ref()
        .ok_or_else(|| CritpipeError::InvalidStartOptions("missing naming function".into()))?;
    let log_path = opts.output_dir.join(name_fn(meta));

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await?;

    info!(stage = %meta.name, log = %log_path.display(), "stage context created");

    let args = match &opts.args_for {
        Some(resolver) => resolver(meta),
        None => meta.default_args.clone(),
    };

    Ok(RunContext {
        log,
        meta: meta.clone(),
        args,
        round_id: opts.round_id,
        signals: Arc::clone(signals),
    })
}
