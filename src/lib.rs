// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod schedule;
pub mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::errors::{CritpipeError, Result};
use crate::exec::run_task_command;
use crate::schedule::{FileTaskSource, Scheduler, SchedulerConfig};
use crate::workflow::{
    NodeId, StartOptions, Workflow, WorkflowOutcome, compute_sequence, start_workflow,
};

/// High-level entry point used by `main.rs`.
///
/// Dispatches to one of the two pipeline roles:
/// - `run`: one round of the collection/scoring workflow,
/// - `drain`: the task scheduler plus a worker pool for per-repository jobs.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(PathBuf::from(&args.config))?;

    match args.command {
        Command::Run {
            round,
            force,
            dry_run,
        } => run_round(&cfg, round, force, dry_run).await,
        Command::Drain { workers } => drain_tasks(&cfg, workers).await,
    }
}

/// Run (or dry-run) one workflow round.
async fn run_round(cfg: &ConfigFile, round: u64, force: bool, dry_run: bool) -> Result<()> {
    let (workflow, root) = Workflow::from_config(cfg)?;

    if dry_run {
        print_dry_run(&workflow, root, force)?;
        return Ok(());
    }

    let workflow = Arc::new(workflow);
    let opts = StartOptions {
        output_dir: PathBuf::from(&cfg.workflow.output_dir).join(format!("round_{round}")),
        log_file_name: Some(Box::new(|meta| format!("{}.log", meta.name))),
        args_for: None,
        round_id: round,
        default_needs_update: force,
    };

    let handle = start_workflow(workflow, root, opts)?;

    // First Ctrl-C stops after the current stage, a second one kills.
    {
        let controller = handle.controller();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Ctrl-C: stopping after the current stage (press again to kill)");
            controller.stop();
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Ctrl-C again: killing workflow");
            controller.kill();
        });
    }

    match handle.wait().await {
        WorkflowOutcome::Completed => {
            info!(round, "round completed");
            Ok(())
        }
        WorkflowOutcome::Stopped => {
            warn!(round, "round stopped before completion");
            Ok(())
        }
        WorkflowOutcome::Killed => {
            warn!(round, "round killed before completion");
            Ok(())
        }
        WorkflowOutcome::Failed(reason) => Err(CritpipeError::Other(anyhow!(
            "round {round} failed: {reason}"
        ))),
    }
}

/// Start the scheduler and a pool of workers draining per-repository tasks.
async fn drain_tasks(cfg: &ConfigFile, workers: Option<usize>) -> Result<()> {
    let source_file = cfg.scheduler.source_file.as_ref().ok_or_else(|| {
        CritpipeError::ConfigError("[scheduler].source_file is required for drain".into())
    })?;
    let worker_cmd = cfg.worker.cmd.clone().ok_or_else(|| {
        CritpipeError::ConfigError("[worker].cmd is required for drain".into())
    })?;
    let worker_count = workers.unwrap_or(cfg.worker.count).max(1);

    let source = Arc::new(FileTaskSource::new(source_file));
    let sched = Scheduler::new(SchedulerConfig::from_section(&cfg.scheduler), source);

    info!(workers = worker_count, source = %source_file, "starting task drain");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Ctrl-C closes the gate and winds the workers down.
    {
        let sched = Arc::clone(&sched);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Ctrl-C: stopping scheduler and draining workers");
            sched.stop().await;
            let _ = shutdown_tx.send(true);
        });
    }

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let sched = Arc::clone(&sched);
        let cmd = worker_cmd.clone();
        let mut shutdown = shutdown_rx.clone();

        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    task = sched.get_task() => {
                        let task = match task {
                            Ok(task) => task,
                            Err(err) => {
                                error!(worker = worker_id, error = %err, "scheduler error");
                                break;
                            }
                        };
                        info!(worker = worker_id, task = %task, "running task");
                        if let Err(err) = run_task_command(&cmd, &task).await {
                            error!(worker = worker_id, task = %task, error = %err, "task command failed");
                        }
                        sched.finish_task(task).await;
                    }
                }
            }
            info!(worker = worker_id, "worker exiting");
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

/// Print the computed build sequence without executing anything.
fn print_dry_run(workflow: &Workflow, root: NodeId, force: bool) -> Result<()> {
    let sequence = compute_sequence(workflow, root, force)?;

    println!("critpipe dry-run (root = {})", workflow.meta(root).name);
    if sequence.is_empty() {
        println!("  everything is up to date, nothing would run");
        return Ok(());
    }

    for (i, level) in sequence.iter().enumerate() {
        println!("  level {i}:");
        for &node in level {
            let meta = workflow.meta(node);
            if meta.title != meta.name {
                println!("    - {} ({})", meta.name, meta.title);
            } else {
                println!("    - {}", meta.name);
            }
        }
    }

    Ok(())
}
