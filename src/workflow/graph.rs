// src/workflow/graph.rs

use crate::workflow::node::{NodeId, Workflow};

/// Dependency graph of the nodes reachable from a root, as adjacency lists
/// over arena ids.
///
/// Built by a depth-first traversal of the dependency edges (node -> its
/// prerequisites), guarded by a visited set so shared and cyclic subgraphs
/// are walked once. Holds:
/// - the forward adjacency (dependency -> dependents), used for taint
///   propagation and in-degree bookkeeping,
/// - the in-degree of every member (count of unresolved prerequisites),
/// - the set of reachable members in discovery order.
#[derive(Debug, Clone)]
pub struct DepGraph {
    dependents: Vec<Vec<NodeId>>,
    indegree: Vec<usize>,
    members: Vec<NodeId>,
}

impl DepGraph {
    /// Traverse from `root` and build the graph.
    ///
    /// The vectors are indexed by raw arena id; slots of unreachable nodes
    /// stay empty/zero and are never consulted by the sequencer.
    pub fn build(workflow: &Workflow, root: NodeId) -> Self {
        let size = workflow.node_count();
        let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); size];
        let mut indegree = vec![0usize; size];
        let mut visited = vec![false; size];
        let mut members = Vec::new();

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if visited[node.0] {
                continue;
            }
            visited[node.0] = true;
            members.push(node);

            let deps = workflow.deps(node);
            indegree[node.0] = deps.len();
            for &dep in deps {
                // Record the reverse edge even when `dep` was already
                // visited; a cycle must still show up as a non-zero
                // in-degree so the sequencer can report it.
                dependents[dep.0].push(node);
                stack.push(dep);
            }
        }

        Self {
            dependents,
            indegree,
            members,
        }
    }

    /// Nodes reachable from the root, in discovery order.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Direct dependents of a node (nodes that list it as a prerequisite).
    pub fn dependents_of(&self, id: NodeId) -> &[NodeId] {
        &self.dependents[id.0]
    }

    /// Number of unresolved prerequisites of a node.
    pub fn indegree_of(&self, id: NodeId) -> usize {
        self.indegree[id.0]
    }
}
