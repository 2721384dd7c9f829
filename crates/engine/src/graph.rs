//! Execution graph construction and static checks.
//!
//! [`ExecutionGraph::build`] is total: it never fails. Edges whose target is
//! not a known node are dropped, cycles are kept (loop nodes rely on them).
//!
//! [`check`] reports problems worth surfacing before a run:
//! 1. Node IDs must be unique within the workflow.
//! 2. Exactly one node should be of kind `start`.
//! 3. Every edge should reference known node IDs on both ends.
//! 4. Every node should be reachable from the start node.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::models::{NodeKind, WorkflowEdge, WorkflowNode};

/// One outgoing connection of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Successor {
    pub node: WorkflowNode,
    /// Branch label of the edge; `None` for unconditional edges.
    pub handle: Option<String>,
}

/// Adjacency lists keyed by node id, built once per run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionGraph {
    nodes: Vec<WorkflowNode>,
    adjacency: HashMap<String, Vec<Successor>>,
}

impl ExecutionGraph {
    /// Build adjacency lists, preserving edge input order per source node.
    pub fn build(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Self {
        let mut adjacency: HashMap<String, Vec<Successor>> = HashMap::new();
        let mut by_id: HashMap<&str, &WorkflowNode> = HashMap::new();

        for node in nodes {
            adjacency.entry(node.id.clone()).or_default();
            by_id.entry(node.id.as_str()).or_insert(node);
        }

        for edge in edges {
            let Some(target) = by_id.get(edge.target.as_str()) else {
                continue;
            };
            let Some(successors) = adjacency.get_mut(&edge.source) else {
                continue;
            };
            successors.push(Successor {
                node: (*target).clone(),
                handle: edge.branch_handle().map(str::to_owned),
            });
        }

        Self {
            nodes: nodes.to_vec(),
            adjacency,
        }
    }

    /// The first node of kind `start`, in node input order.
    pub fn start_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    pub fn successors(&self, node_id: &str) -> &[Successor] {
        self.adjacency
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    /// Number of retained edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Static checks
// ---------------------------------------------------------------------------

/// A structural problem found by [`check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// Two or more nodes share the same ID.
    DuplicateNodeId(String),
    MissingStartNode,
    /// More than one start node; the first one is used.
    MultipleStartNodes(Vec<String>),
    /// An edge references a node ID that doesn't exist in the workflow.
    DanglingEdge {
        edge_id: String,
        node_id: String,
        side: &'static str,
    },
    /// No path leads from the start node to this node.
    Unreachable(String),
}

impl GraphIssue {
    /// Errors make a workflow unrunnable or ambiguous; the rest are warnings.
    pub fn is_error(&self) -> bool {
        matches!(self, GraphIssue::DuplicateNodeId(_) | GraphIssue::MissingStartNode)
    }
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::DuplicateNodeId(id) => write!(f, "duplicate node ID '{id}'"),
            GraphIssue::MissingStartNode => f.write_str("no start node"),
            GraphIssue::MultipleStartNodes(ids) => {
                write!(f, "multiple start nodes ({}), using '{}'", ids.join(", "), ids[0])
            }
            GraphIssue::DanglingEdge {
                edge_id,
                node_id,
                side,
            } => write!(f, "edge '{edge_id}' references unknown node '{node_id}' ({side} side)"),
            GraphIssue::Unreachable(id) => write!(f, "node '{id}' is unreachable from the start node"),
        }
    }
}

/// Inspect a workflow without running it.
pub fn check(nodes: &[WorkflowNode], edges: &[WorkflowEdge]) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    // -----------------------------------------------------------------------
    // 1. Unique node IDs
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !seen_ids.insert(node.id.as_str()) {
            issues.push(GraphIssue::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Start node
    // -----------------------------------------------------------------------
    let starts: Vec<String> = nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .map(|n| n.id.clone())
        .collect();
    match starts.len() {
        0 => issues.push(GraphIssue::MissingStartNode),
        1 => {}
        _ => issues.push(GraphIssue::MultipleStartNodes(starts.clone())),
    }

    // -----------------------------------------------------------------------
    // 3. Edge endpoints
    // -----------------------------------------------------------------------
    for edge in edges {
        for (node_id, side) in [(&edge.source, "source"), (&edge.target, "target")] {
            if !seen_ids.contains(node_id.as_str()) {
                issues.push(GraphIssue::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                    side,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 4. Reachability (breadth-first from the first start node)
    // -----------------------------------------------------------------------
    if let Some(start) = starts.first() {
        let graph = ExecutionGraph::build(nodes, edges);
        let mut reached: HashSet<&str> = HashSet::from([start.as_str()]);
        let mut queue: VecDeque<&str> = VecDeque::from([start.as_str()]);

        while let Some(node_id) = queue.pop_front() {
            for successor in graph.successors(node_id) {
                if reached.insert(successor.node.id.as_str()) {
                    queue.push_back(successor.node.id.as_str());
                }
            }
        }

        let mut reported: HashSet<&str> = HashSet::new();
        for node in nodes {
            if !reached.contains(node.id.as_str()) && reported.insert(node.id.as_str()) {
                issues.push(GraphIssue::Unreachable(node.id.clone()));
            }
        }
    }

    issues
}
