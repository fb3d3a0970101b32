//! Edge validity after branching
//!
//! If/else and switch nodes record a branch result when they run. An edge
//! carrying a `sourceHandle` is live only when that handle matches the
//! recorded result of its source; unconditional edges are always live.

use std::collections::HashMap;

use crate::types::{GraphIndex, NodeId, NodeKind, WorkflowEdge};

/// Per-run record of branch outcomes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchResults {
    if_else: HashMap<NodeId, bool>,
    switch: HashMap<NodeId, Option<String>>,
}

impl BranchResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_if_else(&mut self, node_id: impl Into<NodeId>, condition: bool) {
        self.if_else.insert(node_id.into(), condition);
    }

    /// Record the matched case value, or `None` when no case matched
    pub fn record_switch(&mut self, node_id: impl Into<NodeId>, matched: Option<String>) {
        self.switch.insert(node_id.into(), matched);
    }

    pub fn if_else(&self, node_id: &str) -> Option<bool> {
        self.if_else.get(node_id).copied()
    }

    /// `None` if the switch has not run; `Some(None)` if it ran without a match
    pub fn switch(&self, node_id: &str) -> Option<Option<&str>> {
        self.switch.get(node_id).map(|m| m.as_deref())
    }
}

/// What the controller should do with a node
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision<'a> {
    /// Execute, assembling input from these edges
    Run { valid_edges: Vec<&'a WorkflowEdge> },
    /// Every incoming edge is a dead branch
    Skip,
}

impl RouteDecision<'_> {
    pub fn is_skip(&self) -> bool {
        matches!(self, RouteDecision::Skip)
    }
}

/// Whether a single edge is live given the branch results so far
pub fn is_edge_valid(edge: &WorkflowEdge, index: &GraphIndex<'_>, branches: &BranchResults) -> bool {
    let Some(handle) = edge.source_handle.as_deref() else {
        return true;
    };

    let Some(source) = index.node(&edge.source) else {
        return false;
    };

    match source.kind() {
        NodeKind::IfElse => match branches.if_else(&source.id) {
            Some(true) => handle == "true",
            Some(false) => handle == "false",
            None => false,
        },
        NodeKind::Switch => match branches.switch(&source.id) {
            Some(matched) => matched == Some(handle),
            None => false,
        },
        _ => false,
    }
}

/// Decide whether a node runs and which incoming edges feed it
pub fn route<'a>(
    node_id: &str,
    index: &GraphIndex<'a>,
    branches: &BranchResults,
) -> RouteDecision<'a> {
    let incoming = index.incoming(node_id);

    let valid_edges: Vec<&'a WorkflowEdge> = incoming
        .iter()
        .copied()
        .filter(|edge| is_edge_valid(edge, index, branches))
        .collect();

    let all_conditional = incoming.iter().all(|edge| edge.is_conditional());
    if !incoming.is_empty() && all_conditional && valid_edges.is_empty() {
        log::debug!("Node '{}' skipped: no live branch leads to it", node_id);
        return RouteDecision::Skip;
    }

    RouteDecision::Run { valid_edges }
}
