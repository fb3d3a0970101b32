//! Core types for workflow graphs
//!
//! These types define the structure of a stored workflow: typed nodes,
//! directional edges (optionally tagged with a branch handle), and the
//! per-run index the scheduler and router work from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// A node instance in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    /// Unique identifier within the graph
    pub id: NodeId,
    /// Discriminator selecting a handler (e.g. "http-request")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable label shown in logs
    #[serde(default)]
    pub label: String,
    /// Palette category (e.g. "trigger", "ai", "action")
    #[serde(default)]
    pub category: String,
    /// Handler-specific configuration
    #[serde(default = "empty_config")]
    pub config: Value,
}

fn empty_config() -> Value {
    Value::Object(serde_json::Map::new())
}

impl WorkflowNode {
    /// Create a node with an empty config
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: String::new(),
            category: String::new(),
            config: empty_config(),
        }
    }

    /// The name used in logs: the label, or the id when unlabeled
    pub fn display_name(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Classify this node's type string
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_type(&self.node_type)
    }

    /// Read a string config field
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Read a numeric config field, accepting numeric strings
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        match self.config.get(key)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a boolean config field
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.as_bool())
    }
}

/// A directed link between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEdge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Target node ID
    pub target: NodeId,
    /// Branch discriminator: "true"/"false" for if/else, a case value for switch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
}

impl WorkflowEdge {
    /// Create an unconditional edge
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    /// Whether this edge carries a branch discriminator
    pub fn is_conditional(&self) -> bool {
        self.source_handle.is_some()
    }
}

/// A stored workflow template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier for this workflow
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Owner of the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    /// Edges in declaration order
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl Workflow {
    /// Create a new empty workflow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            user_id: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// The kinds of trigger that can start a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Schedule,
    Webhook,
    Chat,
    Interval,
    /// Started by another workflow
    Workflow,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Schedule => "schedule",
            TriggerKind::Webhook => "webhook",
            TriggerKind::Chat => "chat",
            TriggerKind::Interval => "interval",
            TriggerKind::Workflow => "workflow",
        }
    }

    /// The node type string registered for this trigger
    pub fn node_type(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual-trigger",
            TriggerKind::Schedule => "schedule-trigger",
            TriggerKind::Webhook => "webhook-trigger",
            TriggerKind::Chat => "chat-trigger",
            TriggerKind::Interval => "interval-trigger",
            TriggerKind::Workflow => "workflow-trigger",
        }
    }

    pub const ALL: [TriggerKind; 6] = [
        TriggerKind::Manual,
        TriggerKind::Schedule,
        TriggerKind::Webhook,
        TriggerKind::Chat,
        TriggerKind::Interval,
        TriggerKind::Workflow,
    ];
}

/// How the engine treats a node, derived from its type string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Trigger(TriggerKind),
    IfElse,
    Switch,
    /// Entry point of the error-recovery path; never runs forward
    ErrorTrigger,
    /// Everything else: transforms and external actions
    Action,
}

impl NodeKind {
    pub fn from_type(node_type: &str) -> Self {
        match node_type {
            "if-else" | "if" => NodeKind::IfElse,
            "switch" => NodeKind::Switch,
            "error-trigger" => NodeKind::ErrorTrigger,
            other => TriggerKind::ALL
                .iter()
                .find(|k| k.node_type() == other)
                .map(|k| NodeKind::Trigger(*k))
                .unwrap_or(NodeKind::Action),
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, NodeKind::Trigger(_))
    }

    /// If/else and switch nodes record branch results
    pub fn is_branch(&self) -> bool {
        matches!(self, NodeKind::IfElse | NodeKind::Switch)
    }
}

/// Lookup tables built once per run
///
/// Incoming edge lists preserve declaration order so that input assembly is
/// deterministic.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    nodes: HashMap<&'a str, &'a WorkflowNode>,
    incoming: HashMap<&'a str, Vec<&'a WorkflowEdge>>,
}

impl<'a> GraphIndex<'a> {
    pub fn new(workflow: &'a Workflow) -> Self {
        let mut nodes = HashMap::new();
        for node in &workflow.nodes {
            nodes.entry(node.id.as_str()).or_insert(node);
        }

        let mut incoming: HashMap<&str, Vec<&WorkflowEdge>> = HashMap::new();
        for edge in &workflow.edges {
            incoming.entry(edge.target.as_str()).or_default().push(edge);
        }

        Self { nodes, incoming }
    }

    pub fn node(&self, id: &str) -> Option<&'a WorkflowNode> {
        self.nodes.get(id).copied()
    }

    pub fn incoming(&self, id: &str) -> &[&'a WorkflowEdge] {
        self.incoming.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_classification() {
        assert_eq!(NodeKind::from_type("if-else"), NodeKind::IfElse);
        assert_eq!(NodeKind::from_type("if"), NodeKind::IfElse);
        assert_eq!(NodeKind::from_type("switch"), NodeKind::Switch);
        assert_eq!(NodeKind::from_type("error-trigger"), NodeKind::ErrorTrigger);
        assert_eq!(
            NodeKind::from_type("webhook-trigger"),
            NodeKind::Trigger(TriggerKind::Webhook)
        );
        assert_eq!(NodeKind::from_type("http-request"), NodeKind::Action);
    }

    #[test]
    fn test_deserialize_node_and_edge() {
        let workflow: Workflow = serde_json::from_value(serde_json::json!({
            "id": "wf",
            "name": "Test",
            "nodes": [
                {"id": "a", "type": "manual-trigger"},
                {"id": "b", "type": "if-else", "label": "Check", "config": {"condition": "true"}}
            ],
            "edges": [
                {"id": "e1", "source": "a", "target": "b"},
                {"id": "e2", "source": "b", "target": "a", "sourceHandle": "true"}
            ]
        }))
        .unwrap();

        assert_eq!(workflow.nodes[0].config, serde_json::json!({}));
        assert_eq!(workflow.nodes[0].display_name(), "a");
        assert_eq!(workflow.nodes[1].display_name(), "Check");
        assert!(!workflow.edges[0].is_conditional());
        assert_eq!(workflow.edges[1].source_handle.as_deref(), Some("true"));
    }

    #[test]
    fn test_graph_index_preserves_edge_order() {
        let mut workflow = Workflow::new("wf", "Test");
        workflow.nodes.push(WorkflowNode::new("a", "noop"));
        workflow.nodes.push(WorkflowNode::new("b", "noop"));
        workflow.nodes.push(WorkflowNode::new("c", "noop"));
        workflow.edges.push(WorkflowEdge::new("e1", "b", "c"));
        workflow.edges.push(WorkflowEdge::new("e2", "a", "c"));

        let index = GraphIndex::new(&workflow);
        let sources: Vec<&str> = index.incoming("c").iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["b", "a"]);
        assert_eq!(index.node("c").map(|n| n.node_type.as_str()), Some("noop"));
        assert!(index.incoming("a").is_empty());
    }

    #[test]
    fn test_config_accessors() {
        let mut node = WorkflowNode::new("w", "wait");
        node.config = serde_json::json!({"ms": "250", "flag": true, "name": "x"});
        assert_eq!(node.config_u64("ms"), Some(250));
        assert_eq!(node.config_bool("flag"), Some(true));
        assert_eq!(node.config_str("name"), Some("x"));
        assert_eq!(node.config_str("missing"), None);
    }
}
