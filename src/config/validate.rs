// src/config/validate.rs

use anyhow::{Result, anyhow};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;

/// Run basic semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one stage
/// - `[workflow].root`, if set, names an existing stage
/// - all `after` dependencies refer to existing stages
/// - no stage depends on itself
/// - the stage graph has no cycles
/// - scheduler page size and refill threshold are >= 1
///
/// It does **not** check that stage commands are runnable or that the
/// scheduler source file exists; those are runtime concerns.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    ensure_has_stages(cfg)?;
    validate_root(cfg)?;
    validate_stage_dependencies(cfg)?;
    validate_dag(cfg)?;
    validate_scheduler(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &ConfigFile) -> Result<()> {
    if cfg.stage.is_empty() {
        return Err(anyhow!(
            "config must contain at least one [stage.<name>] section"
        ));
    }
    Ok(())
}

fn validate_root(cfg: &ConfigFile) -> Result<()> {
    if let Some(root) = &cfg.workflow.root
        && !cfg.stage.contains_key(root)
    {
        return Err(anyhow!(
            "[workflow].root refers to unknown stage '{}'",
            root
        ));
    }
    Ok(())
}

fn validate_stage_dependencies(cfg: &ConfigFile) -> Result<()> {
    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            if !cfg.stage.contains_key(dep) {
                return Err(anyhow!(
                    "stage '{}' has unknown dependency '{}' in `after`",
                    name,
                    dep
                ));
            }
            if dep == name {
                return Err(anyhow!(
                    "stage '{}' cannot depend on itself in `after`",
                    name
                ));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &ConfigFile) -> Result<()> {
    // Edge direction: dep -> stage. For:
    //   [stage.score]
    //   after = ["git"]
    // we add edge git -> score.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.stage.keys() {
        graph.add_node(name.as_str());
    }

    for (name, stage) in cfg.stage.iter() {
        for dep in stage.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort fails iff there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(anyhow!(
            "cycle detected in stage DAG involving stage '{}'",
            cycle.node_id()
        )),
    }
}

fn validate_scheduler(cfg: &ConfigFile) -> Result<()> {
    if cfg.scheduler.fetch_size == 0 {
        return Err(anyhow!("[scheduler].fetch_size must be >= 1 (got 0)"));
    }
    if cfg.scheduler.fetch_threshold == 0 {
        return Err(anyhow!("[scheduler].fetch_threshold must be >= 1 (got 0)"));
    }
    Ok(())
}
