// src/workflow/node.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::model::ConfigFile;
use crate::errors::{CritpipeError, Result};
use crate::exec::CommandStage;
use crate::workflow::runner::RunContext;
use crate::workflow::sequence::compute_sequence;

/// Stable index of a node in a [`Workflow`] arena.
///
/// Ids are assigned at registration and are only meaningful within the arena
/// that produced them; graph structures are adjacency lists over these ids, so
/// nothing downstream relies on pointer identity or hashing of node values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Display metadata for one pipeline stage.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    /// Unique stage name; used for log file names and stable ordering.
    pub name: String,
    /// Human-readable title shown in logs.
    pub title: String,
    /// Longer description, purely informational.
    pub description: String,
    /// Free-form category, e.g. "collector", "score".
    pub kind: String,
    /// Opaque default arguments handed to the hooks unless the run's
    /// argument resolver overrides them.
    pub default_args: serde_json::Value,
}

impl NodeMeta {
    /// Metadata with just a name; title defaults to the name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            description: String::new(),
            kind: String::new(),
            default_args: serde_json::Value::Null,
        }
    }
}

/// Capabilities of one pipeline stage, as seen by the orchestration core.
///
/// The core treats all of these as opaque: collectors, scoring binaries and
/// test fakes implement only the hooks they need (everything defaults to a
/// no-op). Hooks run sequentially within a workflow run; `stop`/`kill` are
/// observed at node boundaries, so a long-running `run` that wants to be
/// responsive should poll [`RunContext::stop_requested`] itself.
#[async_trait]
pub trait StageHooks: Send + Sync {
    /// Whether this stage is stale and needs to be re-run.
    ///
    /// `None` defers to the run's `default_needs_update` flag. A tainted
    /// upstream stage overrides this in either case.
    fn needs_update(&self) -> Option<bool> {
        None
    }

    /// Passive stages only group their dependencies; the runner skips them
    /// without creating an execution context.
    fn is_passive(&self) -> bool {
        false
    }

    /// Runs before the main action.
    async fn setup(&self, _ctx: &mut RunContext) -> Result<()> {
        Ok(())
    }

    /// The main action.
    async fn run(&self, _ctx: &mut RunContext) -> Result<()> {
        Ok(())
    }

    /// Runs after the main action, observing its result (also on failure).
    async fn teardown(&self, _ctx: &mut RunContext, _result: &Result<()>) -> Result<()> {
        Ok(())
    }
}

/// A stage that does nothing itself and only bundles its dependencies.
pub struct GroupStage;

#[async_trait]
impl StageHooks for GroupStage {
    fn is_passive(&self) -> bool {
        true
    }
}

struct NodeEntry {
    meta: NodeMeta,
    hooks: Arc<dyn StageHooks>,
    deps: Vec<NodeId>,
}

/// Arena of workflow nodes and their dependency edges.
///
/// Dependencies point from a node to its prerequisites. The arena itself does
/// not enforce acyclicity; the build sequencer detects cycles when a run is
/// computed (and config-built workflows are additionally validated up front).
#[derive(Default)]
pub struct Workflow {
    nodes: Vec<NodeEntry>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage and return its id.
    pub fn add_stage(
        &mut self,
        meta: NodeMeta,
        hooks: Arc<dyn StageHooks>,
        deps: &[NodeId],
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeEntry {
            meta,
            hooks,
            deps: deps.to_vec(),
        });
        id
    }

    /// Add a dependency edge after registration (used when stages are created
    /// before all of their prerequisites are known, e.g. from config).
    pub fn add_dependency(&mut self, node: NodeId, dep: NodeId) {
        self.nodes[node.0].deps.push(dep);
    }

    pub fn meta(&self, id: NodeId) -> &NodeMeta {
        &self.nodes[id.0].meta
    }

    pub fn hooks(&self, id: NodeId) -> &Arc<dyn StageHooks> {
        &self.nodes[id.0].hooks
    }

    pub fn deps(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].deps
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.meta.name == name)
            .map(NodeId)
    }

    /// True if a run from `root` with `default_needs_update = false` would
    /// execute nothing, i.e. every reachable stage is up to date.
    pub fn all_up_to_date(&self, root: NodeId) -> Result<bool> {
        let seq = compute_sequence(self, root, false)?;
        Ok(seq.is_empty())
    }

    /// Build a workflow from the `[stage.*]` sections of a config file.
    ///
    /// Stages with a `cmd` become [`CommandStage`]s; stages without become
    /// passive [`GroupStage`]s. Returns the arena plus the id of the
    /// configured `[workflow].root` stage.
    ///
    /// Two passes: first register every stage, then wire `after` edges, so
    /// declaration order in the file does not matter.
    pub fn from_config(cfg: &ConfigFile) -> Result<(Self, NodeId)> {
        let mut workflow = Workflow::new();
        let mut ids: HashMap<&str, NodeId> = HashMap::new();

        for (name, stage) in cfg.stage.iter() {
            let mut meta = NodeMeta::named(name.clone());
            if let Some(title) = &stage.title {
                meta.title = title.clone();
            }
            if let Some(description) = &stage.description {
                meta.description = description.clone();
            }
            if let Some(kind) = &stage.kind {
                meta.kind = kind.clone();
            }
            if let Some(args) = &stage.args {
                meta.default_args = serde_json::to_value(args)
                    .map_err(|e| CritpipeError::ConfigError(format!(
                        "stage '{name}' has unrepresentable args: {e}"
                    )))?;
            }

            let hooks: Arc<dyn StageHooks> = match &stage.cmd {
                Some(cmd) => {
                    Arc::new(CommandStage::new(cmd.clone()).with_needs_update(stage.needs_update))
                }
                None => Arc::new(GroupStage),
            };

            let id = workflow.add_stage(meta, hooks, &[]);
            ids.insert(name.as_str(), id);
        }

        for (name, stage) in cfg.stage.iter() {
            // Unknown deps are a validation error before we ever get here,
            // but config construction should not panic on unvalidated input.
            let node = ids[name.as_str()];
            for dep in stage.after.iter() {
                let dep_id = ids
                    .get(dep.as_str())
                    .copied()
                    .ok_or_else(|| CritpipeError::UnknownStage(dep.clone()))?;
                workflow.add_dependency(node, dep_id);
            }
        }

        let root_name = cfg
            .workflow
            .root
            .as_deref()
            .ok_or_else(|| CritpipeError::ConfigError("[workflow].root is required".into()))?;
        let root = workflow
            .node_by_name(root_name)
            .ok_or_else(|| CritpipeError::UnknownStage(root_name.to_string()))?;

        Ok((workflow, root))
    }
}
