// src/workflow/sequence.rs

use tracing::debug;

use crate::errors::{CritpipeError, Result};
use crate::workflow::graph::DepGraph;
use crate::workflow::node::{NodeId, Workflow};

/// Compute the build sequence for a run starting at `root`.
///
/// Returns an ordered list of levels. Nodes within one level have no edges
/// between them, so a level is safe to execute in parallel; the runner
/// currently walks them sequentially. Within a level, nodes are ordered
/// lexicographically by name so repeated invocations are reproducible.
///
/// Per level (one Kahn round over the reachable subgraph):
/// - extract the frontier of nodes with in-degree 0; an empty frontier with
///   nodes remaining means a cycle, reported as a terminal error with no
///   partial result;
/// - resolve staleness per frontier node: tainted by an upstream stage means
///   stale; otherwise the stage's own predicate, falling back to
///   `default_needs_update` when it has none;
/// - a stale node taints every transitive dependent, so downstream stages
///   rebuild even if their own predicate says no;
/// - stale frontier nodes form the level; a round where nothing is stale
///   contributes no level but graph consumption continues.
pub fn compute_sequence(
    workflow: &Workflow,
    root: NodeId,
    default_needs_update: bool,
) -> Result<Vec<Vec<NodeId>>> {
    let graph = DepGraph::build(workflow, root);

    let size = workflow.node_count();
    let mut in_graph = vec![false; size];
    for &id in graph.members() {
        in_graph[id.0] = true;
    }
    let mut indegree: Vec<usize> = (0..size).map(|i| graph.indegree_of(NodeId(i))).collect();
    let mut tainted = vec![false; size];
    let mut remaining = graph.members().len();

    let mut sequence: Vec<Vec<NodeId>> = Vec::new();

    while remaining > 0 {
        let mut frontier: Vec<NodeId> = graph
            .members()
            .iter()
            .copied()
            .filter(|id| in_graph[id.0] && indegree[id.0] == 0)
            .collect();

        if frontier.is_empty() {
            return Err(CritpipeError::CircularDependency);
        }

        frontier.sort_by(|a, b| workflow.meta(*a).name.cmp(&workflow.meta(*b).name));

        let mut level = Vec::new();
        for node in frontier {
            let stale = if tainted[node.0] {
                // Taint already reached everything downstream of this node;
                // no need to propagate again.
                true
            } else {
                let stale = workflow
                    .hooks(node)
                    .needs_update()
                    .unwrap_or(default_needs_update);
                if stale {
                    taint_dependents(&graph, node, &mut tainted);
                }
                stale
            };

            if stale {
                level.push(node);
            } else {
                debug!(stage = %workflow.meta(node).name, "stage up to date, not scheduled");
            }

            for &dependent in graph.dependents_of(node) {
                indegree[dependent.0] -= 1;
            }
            in_graph[node.0] = false;
            remaining -= 1;
        }

        if !level.is_empty() {
            sequence.push(level);
        }
    }

    Ok(sequence)
}

/// Mark every transitive dependent of `node` as tainted (forward DFS).
///
/// The taint map doubles as the visited set: taint is monotone, and a node
/// that is already tainted has already had its dependents tainted.
fn taint_dependents(graph: &DepGraph, node: NodeId, tainted: &mut [bool]) {
    let mut stack: Vec<NodeId> = graph.dependents_of(node).to_vec();
    while let Some(n) = stack.pop() {
        if tainted[n.0] {
            continue;
        }
        tainted[n.0] = true;
        stack.extend_from_slice(graph.dependents_of(n));
    }
}
