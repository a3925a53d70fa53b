// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [workflow]
/// root = "score"
/// output_dir = "rounds"
///
/// [scheduler]
/// fetch_size = 200
/// fetch_threshold = 30
///
/// [stage.score]
/// cmd = "gen-scores"
/// after = ["git", "depsdev"]
/// ```
///
/// All sections are optional and have reasonable defaults; `run` and `drain`
/// check for the parts they actually need.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Workflow-level settings from `[workflow]`.
    #[serde(default)]
    pub workflow: WorkflowSection,

    /// Task scheduler tuning from `[scheduler]`.
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Worker pool settings from `[worker]`, used by `drain`.
    #[serde(default)]
    pub worker: WorkerSection,

    /// All pipeline stages from `[stage.<name>]`.
    ///
    /// Keys are the *stage names* (e.g. `"git"`, `"depsdev"`, `"score"`).
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    /// Name of the root stage the run starts from.
    ///
    /// The root is the stage that (transitively) depends on everything that
    /// should be considered for the round. Required by `run`.
    #[serde(default)]
    pub root: Option<String>,

    /// Directory where per-stage log files are written, created if absent.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_output_dir() -> String {
    "rounds".to_string()
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            root: None,
            output_dir: default_output_dir(),
        }
    }
}

/// `[scheduler]` section.
///
/// Mirrors the tuning knobs of the task scheduler: how many task ids to read
/// per page, when to refill, and how long to idle when the store is empty.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Task ids requested per page from the backing store.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Refill the queue in the background once the fetched-task count drops
    /// below this threshold.
    #[serde(default = "default_fetch_threshold")]
    pub fetch_threshold: usize,

    /// Seconds to sleep between fetch attempts when the store yields nothing new.
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    /// Line-per-task-id file backing the scheduler. Required by `drain`.
    #[serde(default)]
    pub source_file: Option<String>,
}

fn default_fetch_size() -> usize {
    200
}

fn default_fetch_threshold() -> usize {
    30
}

fn default_idle_interval_secs() -> u64 {
    30
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            fetch_size: default_fetch_size(),
            fetch_threshold: default_fetch_threshold(),
            idle_interval_secs: default_idle_interval_secs(),
            source_file: None,
        }
    }
}

impl SchedulerSection {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

/// `[worker]` section, used by `drain`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Number of concurrent workers pulling tasks from the scheduler.
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Command template run per task; `{task}` is replaced with the task id.
    #[serde(default)]
    pub cmd: Option<String>,
}

fn default_worker_count() -> usize {
    4
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            cmd: None,
        }
    }
}

/// `[stage.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageConfig {
    /// The command to execute for this stage.
    ///
    /// A stage without a command is a passive grouping node: it only bundles
    /// its dependencies and is skipped by the runner.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Human-readable title shown in logs; defaults to the stage name.
    #[serde(default)]
    pub title: Option<String>,

    /// Longer description, purely informational.
    #[serde(default)]
    pub description: Option<String>,

    /// Free-form category, e.g. "collector", "score".
    #[serde(default)]
    pub kind: Option<String>,

    /// Stages that must run before this one.
    #[serde(default)]
    pub after: Vec<String>,

    /// Per-stage staleness override.
    ///
    /// `Some(false)` means "already up to date, skip unless an upstream stage
    /// taints me"; `None` defers to the run's default flag.
    #[serde(default)]
    pub needs_update: Option<bool>,

    /// Opaque arguments exposed to the stage as JSON (via `CRITPIPE_ARGS`).
    #[serde(default)]
    pub args: Option<toml::Value>,
}
