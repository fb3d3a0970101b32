//! Graph validation for workflows
//!
//! Validates graph structure, node types, branch handles, and detects
//! cycles. All problems are collected rather than stopping at the first.

use std::collections::HashSet;

use crate::error::EngineError;
use crate::registry::NodeRegistry;
use crate::scheduler::topological_order;
use crate::types::{NodeKind, Workflow};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share an id
    DuplicateNode { node_id: String },
    /// An edge references a non-existent node
    UnknownNode { edge_id: String, node_id: String },
    /// Cycle detected in the graph
    CycleDetected { nodes: Vec<String> },
    /// A node has a type no handler is registered for
    UnknownNodeType { node_id: String, node_type: String },
    /// A branch edge's handle can never match its source
    InvalidBranchHandle {
        edge_id: String,
        source: String,
        handle: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "Edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::CycleDetected { nodes } => {
                write!(f, "Cycle detected through nodes: {}", nodes.join(", "))
            }
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::InvalidBranchHandle {
                edge_id,
                source,
                handle,
            } => write!(
                f,
                "Edge '{}' uses handle '{}' which node '{}' can never produce",
                edge_id, handle, source
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Errors that make the graph impossible to index
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::DuplicateNode { .. } | Self::UnknownNode { .. })
    }
}

/// Validate a workflow graph
///
/// Pass a registry to also check that every node type has a handler.
pub fn validate_workflow(
    workflow: &Workflow,
    registry: Option<&NodeRegistry>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    validate_unique_ids(workflow, &mut errors);
    validate_edge_references(workflow, &mut errors);
    validate_branch_handles(workflow, &mut errors);
    detect_cycles(workflow, &mut errors);

    if let Some(reg) = registry {
        validate_node_types(workflow, reg, &mut errors);
    }

    errors
}

/// Reject graphs the controller cannot index
pub fn ensure_structurally_valid(workflow: &Workflow) -> crate::Result<()> {
    let mut errors = Vec::new();
    validate_unique_ids(workflow, &mut errors);
    validate_edge_references(workflow, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::InvalidGraph(
            errors.iter().map(|e| e.to_string()).collect(),
        ))
    }
}

fn validate_unique_ids(workflow: &Workflow, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }
}

/// Check that all edge source/target nodes exist
fn validate_edge_references(workflow: &Workflow, errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &workflow.edges {
        if !node_ids.contains(edge.source.as_str()) {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
            });
        }
        if !node_ids.contains(edge.target.as_str()) {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
            });
        }
    }
}

/// If/else handles must be "true"/"false"; switch handles must name a declared case
fn validate_branch_handles(workflow: &Workflow, errors: &mut Vec<ValidationError>) {
    for edge in &workflow.edges {
        let (Some(handle), Some(source)) = (&edge.source_handle, workflow.find_node(&edge.source))
        else {
            continue;
        };

        let reachable = match source.kind() {
            NodeKind::IfElse => handle == "true" || handle == "false",
            NodeKind::Switch => source
                .config
                .get("cases")
                .and_then(|c| c.as_array())
                .map(|cases| {
                    cases.iter().any(|case| {
                        crate::core_handlers::case_value(case).as_deref() == Some(handle.as_str())
                    })
                })
                .unwrap_or(false),
            _ => false,
        };

        if !reachable {
            errors.push(ValidationError::InvalidBranchHandle {
                edge_id: edge.id.clone(),
                source: source.id.clone(),
                handle: handle.clone(),
            });
        }
    }
}

fn detect_cycles(workflow: &Workflow, errors: &mut Vec<ValidationError>) {
    if let Err(EngineError::GraphCycle { nodes }) = topological_order(workflow) {
        errors.push(ValidationError::CycleDetected { nodes });
    }
}

/// Check that all nodes have known types in the registry
fn validate_node_types(
    workflow: &Workflow,
    registry: &NodeRegistry,
    errors: &mut Vec<ValidationError>,
) {
    for node in &workflow.nodes {
        if !registry.has_node_type(&node.node_type) {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }
}
