//! Dependency ordering for workflow graphs
//!
//! Kahn's algorithm with a declaration-order tie-break: the ready queue is
//! seeded with zero in-degree nodes in the order they appear in the node
//! list, and successors are released in edge declaration order. Nodes left
//! over once the queue drains sit on (or behind) a cycle and are reported
//! as [`EngineError::GraphCycle`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{EngineError, Result};
use crate::types::{NodeId, NodeKind, Workflow};

/// The two node sequences a run works from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Nodes executed during normal forward processing
    pub forward: Vec<NodeId>,
    /// Error-trigger nodes and the branch hanging off them, run only after a failure
    pub recovery: Vec<NodeId>,
}

impl ExecutionPlan {
    pub fn has_recovery(&self) -> bool {
        !self.recovery.is_empty()
    }
}

/// Order every node in the graph so that each edge's source precedes its target
pub fn topological_order(workflow: &Workflow) -> Result<Vec<NodeId>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(workflow.nodes.len());
    let mut declared: Vec<&str> = Vec::with_capacity(workflow.nodes.len());
    for node in &workflow.nodes {
        if in_degree.insert(node.id.as_str(), 0).is_none() {
            declared.push(node.id.as_str());
        }
    }

    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.edges {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        // Dangling edges are a validation concern, not an ordering one
        if !in_degree.contains_key(source) || !in_degree.contains_key(target) {
            continue;
        }
        successors.entry(source).or_default().push(target);
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = declared
        .iter()
        .copied()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(declared.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for next in successors.get(id).map(|v| v.as_slice()).unwrap_or(&[]) {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if order.len() < declared.len() {
        let ordered: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let nodes: Vec<String> = declared
            .iter()
            .filter(|id| !ordered.contains(*id))
            .map(|id| id.to_string())
            .collect();
        log::warn!("Cycle detected in workflow '{}': {:?}", workflow.id, nodes);
        return Err(EngineError::GraphCycle { nodes });
    }

    Ok(order)
}

/// Split the topological order into forward and recovery sequences
///
/// A node belongs to recovery when it is an error trigger, or when it has
/// incoming edges and every one of them starts at a recovery node.
pub fn build_plan(workflow: &Workflow) -> Result<ExecutionPlan> {
    let order = topological_order(workflow)?;

    let kinds: HashMap<&str, NodeKind> = workflow
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.kind()))
        .collect();
    let mut sources: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &workflow.edges {
        sources
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }

    let mut recovery_set: HashSet<&str> = HashSet::new();
    let mut plan = ExecutionPlan::default();

    for id in &order {
        let is_recovery = match kinds.get(id.as_str()) {
            Some(NodeKind::ErrorTrigger) => true,
            _ => sources
                .get(id.as_str())
                .map(|srcs| !srcs.is_empty() && srcs.iter().all(|s| recovery_set.contains(s)))
                .unwrap_or(false),
        };

        if is_recovery {
            recovery_set.insert(id.as_str());
            plan.recovery.push(id.clone());
        } else {
            plan.forward.push(id.clone());
        }
    }

    log::debug!(
        "Planned workflow '{}': {} forward, {} recovery",
        workflow.id,
        plan.forward.len(),
        plan.recovery.len()
    );

    Ok(plan)
}
