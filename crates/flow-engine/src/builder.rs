//! Fluent builder for workflow graphs
//!
//! Provides a compact API for constructing graphs programmatically,
//! mostly used by tests and by hosts that generate workflows in code.

use crate::types::{Workflow, WorkflowEdge, WorkflowNode};

/// Fluent builder for constructing workflows
///
/// # Example
///
/// ```
/// use flow_engine::WorkflowBuilder;
///
/// let workflow = WorkflowBuilder::new("wf-1", "Order intake")
///     .add_node("start", "manual-trigger")
///     .add_node("check", "if-else")
///     .with_config(serde_json::json!({"condition": "{{input.total}} > 100"}))
///     .add_node("big", "noop")
///     .connect("start", "check")
///     .connect_branch("check", "true", "big")
///     .build();
///
/// assert_eq!(workflow.nodes.len(), 3);
/// assert_eq!(workflow.edges.len(), 2);
/// ```
pub struct WorkflowBuilder {
    id: String,
    name: String,
    user_id: Option<String>,
    nodes: Vec<WorkflowNode>,
    edges: Vec<WorkflowEdge>,
    edge_counter: usize,
}

impl WorkflowBuilder {
    /// Create a new workflow builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            user_id: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_counter: 0,
        }
    }

    /// Set the owning user
    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add a node to the graph
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.nodes.push(WorkflowNode::new(id, node_type));
        self
    }

    /// Set config on the most recently added node
    ///
    /// Must be called immediately after `add_node`.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.config = config;
        }
        self
    }

    /// Set the label on the most recently added node
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.label = label.into();
        }
        self
    }

    /// Set the category on the most recently added node
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.category = category.into();
        }
        self
    }

    /// Add an unconditional edge (auto-generates edge ID)
    pub fn connect(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edge_counter += 1;
        self.edges.push(WorkflowEdge::new(
            format!("edge-{}", self.edge_counter),
            source,
            target,
        ));
        self
    }

    /// Add an edge that is only live when `handle` matches the source's branch result
    pub fn connect_branch(
        mut self,
        source: impl Into<String>,
        handle: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.edge_counter += 1;
        let mut edge = WorkflowEdge::new(format!("edge-{}", self.edge_counter), source, target);
        edge.source_handle = Some(handle.into());
        self.edges.push(edge);
        self
    }

    /// Build the workflow without validation
    pub fn build(self) -> Workflow {
        let mut workflow = Workflow::new(self.id, self.name);
        workflow.user_id = self.user_id;
        workflow.nodes = self.nodes;
        workflow.edges = self.edges;
        workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assigns_edge_ids_and_handles() {
        let workflow = WorkflowBuilder::new("wf", "Test")
            .owned_by("user-1")
            .add_node("a", "manual-trigger")
            .add_node("b", "switch")
            .with_label("Route")
            .add_node("c", "noop")
            .connect("a", "b")
            .connect_branch("b", "x", "c")
            .build();

        assert_eq!(workflow.user_id.as_deref(), Some("user-1"));
        assert_eq!(workflow.nodes[1].label, "Route");
        assert_eq!(workflow.edges[0].id, "edge-1");
        assert_eq!(workflow.edges[1].id, "edge-2");
        assert_eq!(workflow.edges[1].source_handle.as_deref(), Some("x"));
    }
}
