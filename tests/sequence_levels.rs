// tests/sequence_levels.rs

use std::sync::Arc;

use critpipe::errors::CritpipeError;
use critpipe::workflow::{GroupStage, NodeId, NodeMeta, StageHooks, Workflow, compute_sequence};

/// A stage that only carries a staleness flag; all hooks are no-ops.
struct FlagStage {
    needs_update: Option<bool>,
}

impl FlagStage {
    fn stale(flag: bool) -> Arc<dyn StageHooks> {
        Arc::new(FlagStage {
            needs_update: Some(flag),
        })
    }

    fn default_flag() -> Arc<dyn StageHooks> {
        Arc::new(FlagStage { needs_update: None })
    }
}

impl StageHooks for FlagStage {
    fn needs_update(&self) -> Option<bool> {
        self.needs_update
    }
}

fn names(workflow: &Workflow, level: &[NodeId]) -> Vec<String> {
    level
        .iter()
        .map(|id| workflow.meta(*id).name.clone())
        .collect()
}

#[test]
fn stale_root_taints_dependents() {
    // A stale, B and C depend on A and claim to be fresh. Both must still
    // run, one level after A.
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::stale(true), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::stale(false), &[a]);
    let c = wf.add_stage(NodeMeta::named("C"), FlagStage::stale(false), &[a]);
    let root = wf.add_stage(NodeMeta::named("root"), Arc::new(GroupStage), &[b, c]);

    let seq = compute_sequence(&wf, root, false).unwrap();
    assert_eq!(seq.len(), 3);
    assert_eq!(names(&wf, &seq[0]), vec!["A"]);
    assert_eq!(names(&wf, &seq[1]), vec!["B", "C"]);
    assert_eq!(names(&wf, &seq[2]), vec!["root"]);
}

#[test]
fn fresh_graph_yields_empty_sequence() {
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::stale(false), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::stale(false), &[a]);
    let c = wf.add_stage(NodeMeta::named("C"), FlagStage::stale(false), &[a, b]);

    let seq = compute_sequence(&wf, c, false).unwrap();
    assert!(seq.is_empty());
    assert!(wf.all_up_to_date(c).unwrap());
}

#[test]
fn cycle_is_a_terminal_error() {
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::stale(true), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::stale(true), &[a]);
    // Close the loop after registration.
    wf.add_dependency(a, b);

    let err = compute_sequence(&wf, a, false).unwrap_err();
    assert!(matches!(err, CritpipeError::CircularDependency));
}

#[test]
fn diamond_runs_each_stage_exactly_once() {
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::stale(true), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::stale(false), &[a]);
    let c = wf.add_stage(NodeMeta::named("C"), FlagStage::stale(false), &[a]);
    let d = wf.add_stage(NodeMeta::named("D"), FlagStage::stale(false), &[b, c]);

    let seq = compute_sequence(&wf, d, false).unwrap();
    assert_eq!(seq.len(), 3);
    assert_eq!(names(&wf, &seq[0]), vec!["A"]);
    assert_eq!(names(&wf, &seq[1]), vec!["B", "C"]);
    assert_eq!(names(&wf, &seq[2]), vec!["D"]);

    let flat: Vec<NodeId> = seq.into_iter().flatten().collect();
    let mut deduped = flat.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(flat.len(), deduped.len());
}

#[test]
fn skipped_rounds_contribute_no_level() {
    // A is fresh, B is stale on its own, C is tainted by B. The first Kahn
    // round (A alone) contributes no level, but B and C still come out in
    // dependency order.
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::stale(false), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::stale(true), &[a]);
    let c = wf.add_stage(NodeMeta::named("C"), FlagStage::stale(false), &[b]);

    let seq = compute_sequence(&wf, c, false).unwrap();
    assert_eq!(seq.len(), 2);
    assert_eq!(names(&wf, &seq[0]), vec!["B"]);
    assert_eq!(names(&wf, &seq[1]), vec!["C"]);
}

#[test]
fn missing_predicate_falls_back_to_default() {
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::default_flag(), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::default_flag(), &[a]);

    let seq = compute_sequence(&wf, b, true).unwrap();
    assert_eq!(seq.len(), 2);
    assert_eq!(names(&wf, &seq[0]), vec!["A"]);
    assert_eq!(names(&wf, &seq[1]), vec!["B"]);

    let seq = compute_sequence(&wf, b, false).unwrap();
    assert!(seq.is_empty());
}

#[test]
fn levels_are_sorted_by_name() {
    let mut wf = Workflow::new();
    // Register in reverse-alphabetical order to make the sort observable.
    let z = wf.add_stage(NodeMeta::named("zeta"), FlagStage::stale(true), &[]);
    let m = wf.add_stage(NodeMeta::named("mid"), FlagStage::stale(true), &[]);
    let a = wf.add_stage(NodeMeta::named("alpha"), FlagStage::stale(true), &[]);
    let root = wf.add_stage(NodeMeta::named("root"), Arc::new(GroupStage), &[z, m, a]);

    let seq = compute_sequence(&wf, root, false).unwrap();
    assert_eq!(names(&wf, &seq[0]), vec!["alpha", "mid", "zeta"]);
}

#[test]
fn unreachable_stages_are_ignored() {
    let mut wf = Workflow::new();
    let a = wf.add_stage(NodeMeta::named("A"), FlagStage::stale(true), &[]);
    let b = wf.add_stage(NodeMeta::named("B"), FlagStage::stale(true), &[a]);
    // Stale, but not reachable from the chosen root.
    wf.add_stage(NodeMeta::named("orphan"), FlagStage::stale(true), &[]);

    let seq = compute_sequence(&wf, b, false).unwrap();
    let flat: Vec<String> = seq.iter().flat_map(|lvl| names(&wf, lvl)).collect();
    assert_eq!(flat, vec!["A", "B"]);
}
