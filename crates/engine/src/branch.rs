//! Successor selection from a node's outcome.

use nodes::NodeOutcome;

use crate::graph::ExecutionGraph;
use crate::models::WorkflowNode;

/// Successors of a node split by the branch decision.
#[derive(Debug, Default)]
pub struct Selection<'g> {
    /// Nodes to run next, in edge order.
    pub next: Vec<&'g WorkflowNode>,
    /// Nodes whose edge the decision did not take.
    pub bypassed: Vec<&'g WorkflowNode>,
}

/// Pick which outgoing edges of `node_id` to follow.
///
/// [`NodeOutcome::Continue`] follows every edge. Branch and loop outcomes
/// follow only edges whose handle equals their label; unlabelled edges out of
/// a branching node are never taken.
pub fn select_next<'g>(
    graph: &'g ExecutionGraph,
    node_id: &str,
    outcome: NodeOutcome,
) -> Selection<'g> {
    let mut selection = Selection::default();
    let label = outcome.branch_label();

    for successor in graph.successors(node_id) {
        let taken = match label {
            None => true,
            Some(label) => successor.handle.as_deref() == Some(label),
        };
        if taken {
            selection.next.push(&successor.node);
        } else {
            selection.bypassed.push(&successor.node);
        }
    }

    selection
}
