//! Graph validation and the topological walk (spec §4.D, §9 Design Notes:
//! "model the graph as an arena of nodes plus a list of edges; never
//! materialize parent/child back-pointers").

use std::collections::{HashMap, HashSet, VecDeque};

use waba_core::model::{NodeKind, WorkflowNode, WorkflowVersion};
use waba_core::{Error, Result};

/// Validate `validateWorkflowSchema` (spec §4.D item 1): exactly one
/// trigger node, and every edge endpoint refers to an existing node.
pub fn validate_workflow_schema(version: &WorkflowVersion) -> Result<()> {
    let trigger_count = version
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Trigger)
        .count();
    if trigger_count != 1 {
        return Err(Error::Validation(format!(
            "workflow must have exactly one trigger node, found {trigger_count}"
        )));
    }

    let ids: HashSet<&str> = version.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &version.edges {
        if !ids.contains(edge.from.as_str()) {
            return Err(Error::Validation(format!(
                "edge references unknown source node {}",
                edge.from
            )));
        }
        if !ids.contains(edge.to.as_str()) {
            return Err(Error::Validation(format!(
                "edge references unknown target node {}",
                edge.to
            )));
        }
    }

    Ok(())
}

/// The trigger node of a validated version.
pub fn trigger_node(version: &WorkflowVersion) -> Result<&WorkflowNode> {
    version
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Trigger)
        .ok_or_else(|| Error::Validation("workflow has no trigger node".to_string()))
}

/// Successor node ids of `node_id`, in edge-declaration order.
#[must_use]
pub fn successors<'a>(version: &'a WorkflowVersion, node_id: &str) -> Vec<&'a str> {
    version
        .edges
        .iter()
        .filter(|e| e.from == node_id)
        .map(|e| e.to.as_str())
        .collect()
}

/// Breadth-first order of nodes reachable from `start_ids`, each node
/// visited exactly once even if multiple predecessors reach it (spec §4.D
/// item 4: "walk nodes in topological order reachable from the start set").
#[must_use]
pub fn reachable_order<'a>(version: &'a WorkflowVersion, start_ids: &[String]) -> Vec<&'a WorkflowNode> {
    let by_id: HashMap<&str, &WorkflowNode> =
        version.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut visited = HashSet::new();
    let mut queue: VecDeque<&str> = start_ids.iter().map(String::as_str).collect();
    let mut order = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(node) = by_id.get(id) {
            order.push(*node);
            for next in successors(version, id) {
                if !visited.contains(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    order
}
