// src/exec/command.rs

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::{CritpipeError, Result};
use crate::workflow::node::StageHooks;
use crate::workflow::runner::RunContext;

/// A pipeline stage that shells out to a collector or scoring command.
///
/// The orchestration core has no knowledge of what the command does; this is
/// the narrow interface the real collectors (git cloning, distro parsing,
/// deps.dev sync, score generation) are invoked through. Stdout and stderr
/// are streamed line-by-line into the stage's log file.
pub struct CommandStage {
    cmd: String,
    needs_update: Option<bool>,
}

impl CommandStage {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            needs_update: None,
        }
    }

    /// Configure the staleness override (`None` defers to the run default).
    pub fn with_needs_update(mut self, flag: Option<bool>) -> Self {
        self.needs_update = flag;
        self
    }
}

#[async_trait]
impl StageHooks for CommandStage {
    fn needs_update(&self) -> Option<bool> {
        self.needs_update
    }

    async fn run(&self, ctx: &mut RunContext) -> Result<()> {
        info!(stage = %ctx.meta.name, cmd = %self.cmd, "starting stage process");

        let mut cmd = shell_command(&self.cmd);
        cmd.env("CRITPIPE_ROUND", ctx.round_id.to_string())
            .env("CRITPIPE_ARGS", ctx.args.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for stage '{}'", ctx.meta.name))?;

        // Merge stdout and stderr lines through one channel so a single
        // writer can own the log sink while both pipes are drained.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, line_tx.clone());
        }
        drop(line_tx);

        while let Some(line) = line_rx.recv().await {
            debug!(stage = %ctx.meta.name, line = %line, "stage output");
            ctx.write_log(&line).await?;
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for stage '{}'", ctx.meta.name))?;

        if status.success() {
            Ok(())
        } else {
            Err(CritpipeError::StageFailed {
                stage: ctx.meta.name.clone(),
                reason: format!("exit status {}", status.code().unwrap_or(-1)),
            })
        }
    }
}

/// Run a worker command for one scheduled task id.
///
/// `{task}` in the template is replaced with the id. Output lines go to the
/// tracing log at debug; a non-zero exit is an error for the caller to
/// record (the task is still acknowledged, retries are a caller policy).
pub async fn run_task_command(template: &str, task: &str) -> Result<()> {
    let rendered = template.replace("{task}", task);
    debug!(task = %task, cmd = %rendered, "starting worker process");

    let mut cmd = shell_command(&rendered);
    cmd.env("CRITPIPE_TASK", task)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning worker process for task '{task}'"))?;

    let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, line_tx.clone());
    }
    drop(line_tx);

    while let Some(line) = line_rx.recv().await {
        debug!(task = %task, line = %line, "worker output");
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for worker process for task '{task}'"))?;

    if status.success() {
        Ok(())
    } else {
        Err(CritpipeError::StageFailed {
            stage: task.to_string(),
            reason: format!("exit status {}", status.code().unwrap_or(-1)),
        })
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(cmd_str: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_str);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_str);
        c
    }
}

/// Pump lines from a child pipe into the merged line channel.
fn forward_lines(pipe: impl AsyncRead + Unpin + Send + 'static, tx: mpsc::Sender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}
