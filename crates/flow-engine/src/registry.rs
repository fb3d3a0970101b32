//! Node type registry and dispatcher
//!
//! The registry maps node type strings to a descriptor and a handler. One
//! registry is the single source of truth for which node types exist; hosts
//! build it from the engine's core handlers and then merge in their own
//! (see the `flow-nodes` crate).
//!
//! # Usage
//!
//! ```
//! use flow_engine::{EngineConfig, NodeDescriptor, NodeRegistry};
//!
//! let mut registry = NodeRegistry::with_core_handlers(&EngineConfig::default());
//! registry.register_fn(
//!     NodeDescriptor::new("shout", "transform", "Shout"),
//!     |_node, input, _ctx| async move {
//!         let text = input.as_str().unwrap_or_default().to_uppercase();
//!         Ok(serde_json::json!({ "text": text }))
//!     },
//! );
//! assert!(registry.has_node_type("shout"));
//! assert!(registry.has_node_type("if-else"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::context::NodeContext;
use crate::error::NodeError;
use crate::types::WorkflowNode;

/// Executes one node type
///
/// Handlers are called at most once per node per run and must not assume
/// anything about scheduling.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError>;
}

/// Palette metadata for a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub node_type: String,
    pub category: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl NodeDescriptor {
    pub fn new(
        node_type: impl Into<String>,
        category: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            category: category.into(),
            label: label.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

struct RegistryEntry {
    descriptor: NodeDescriptor,
    handler: Arc<dyn NodeHandler>,
}

/// Registry of node types with their descriptors and handlers
#[derive(Default)]
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with triggers, branching and transform nodes
    pub fn with_core_handlers(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        crate::core_handlers::register_core_handlers(&mut registry, config);
        registry
    }

    /// Register a handler; replaces any existing entry for the type
    pub fn register(&mut self, descriptor: NodeDescriptor, handler: Arc<dyn NodeHandler>) {
        if self.entries.contains_key(&descriptor.node_type) {
            log::debug!("Replacing handler for node type '{}'", descriptor.node_type);
        }
        self.entries.insert(
            descriptor.node_type.clone(),
            RegistryEntry {
                descriptor,
                handler,
            },
        );
    }

    /// Register an async closure as a handler
    ///
    /// The closure receives owned copies of the node, input and context.
    pub fn register_fn<F, Fut>(&mut self, descriptor: NodeDescriptor, f: F)
    where
        F: Fn(WorkflowNode, Value, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
    {
        let handler = FnHandler {
            f: Box::new(move |node, input, ctx| Box::pin(f(node, input, ctx))),
        };
        self.register(descriptor, Arc::new(handler));
    }

    pub fn handler(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.entries.get(node_type).map(|e| e.handler.clone())
    }

    pub fn descriptor(&self, node_type: &str) -> Option<&NodeDescriptor> {
        self.entries.get(node_type).map(|e| &e.descriptor)
    }

    /// All descriptors, sorted by category then type
    pub fn descriptors(&self) -> Vec<&NodeDescriptor> {
        let mut all: Vec<&NodeDescriptor> = self.entries.values().map(|e| &e.descriptor).collect();
        all.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.node_type.cmp(&b.node_type))
        });
        all
    }

    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same node type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

type BoxedHandlerFn = Box<
    dyn Fn(WorkflowNode, Value, NodeContext) -> Pin<Box<dyn Future<Output = Result<Value, NodeError>> + Send>>
        + Send
        + Sync,
>;

/// Closure-backed handler
struct FnHandler {
    f: BoxedHandlerFn,
}

#[async_trait]
impl NodeHandler for FnHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        (self.f)(node.clone(), input, ctx.clone()).await
    }
}

/// Resolves a node's type to its handler and invokes it
#[derive(Clone)]
pub struct NodeDispatcher {
    registry: Arc<NodeRegistry>,
}

impl NodeDispatcher {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub async fn dispatch(
        &self,
        node: &WorkflowNode,
        input: Value,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let handler = self
            .registry
            .handler(&node.node_type)
            .ok_or_else(|| NodeError::UnsupportedType(node.node_type.clone()))?;

        log::debug!("Dispatching node '{}' ({})", node.id, node.node_type);
        handler
            .execute(node, input, ctx)
            .await
            .map_err(|e| e.for_node(node.display_name()))
    }
}
