//! Flow Engine - dependency-ordered execution of automation workflows
//!
//! A workflow is a graph of typed nodes joined by directional edges. This
//! crate turns a stored graph plus a triggering input into a deterministic,
//! observable run:
//!
//! - Kahn scheduling with a declaration-order tie-break and explicit cycle errors
//! - if/else and switch routing through tagged edges (`sourceHandle`)
//! - `{{input.path}}` template interpolation for node config
//! - a restricted, fail-closed condition and expression language
//! - a single node registry behind a uniform handler contract
//! - an error-trigger recovery path and incremental execution persistence
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flow_engine::{
//!     EngineConfig, ExecutionController, InMemoryExecutionStore, NodeRegistry,
//!     RunRequest, WorkflowCatalog,
//! };
//!
//! let catalog = Arc::new(WorkflowCatalog::new());
//! catalog.insert(my_workflow)?;
//! let registry = Arc::new(NodeRegistry::with_core_handlers(&EngineConfig::default()));
//! let controller = ExecutionController::new(
//!     catalog,
//!     registry,
//!     Arc::new(InMemoryExecutionStore::new()),
//! );
//!
//! let response = controller.run(RunRequest::new("wf-1", json!({"total": 120}))).await?;
//! println!("{} -> {}", response.status.as_str(), response.output);
//! ```

pub mod builder;
pub mod catalog;
pub mod condition;
pub mod config;
pub mod context;
pub mod controller;
pub mod core_handlers;
pub mod error;
pub mod events;
pub mod execution;
pub mod extensions;
pub mod memory;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod template;
pub mod types;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use catalog::{WorkflowCatalog, WorkflowSummary};
pub use condition::{evaluate_condition, evaluate_expression, ExprError};
pub use config::EngineConfig;
pub use context::NodeContext;
pub use controller::ExecutionController;
pub use error::{EngineError, NodeError, Result};
pub use events::{EventError, EventSink, LogEventSink, NullEventSink, VecEventSink, WorkflowEvent};
pub use execution::{Execution, ExecutionLog, ExecutionStatus, LogStatus, RunRequest, RunResponse};
pub use extensions::{extension_keys, ExecutorExtensions};
pub use memory::{ConversationMemory, ConversationTurn, InMemoryConversationMemory, Role};
pub use registry::{NodeDescriptor, NodeDispatcher, NodeHandler, NodeRegistry};
pub use router::{BranchResults, RouteDecision};
pub use scheduler::{build_plan, topological_order, ExecutionPlan};
pub use store::{ExecutionStore, InMemoryExecutionStore, JsonFileExecutionStore};
pub use types::{
    EdgeId, GraphIndex, NodeId, NodeKind, TriggerKind, Workflow, WorkflowEdge, WorkflowNode,
};
pub use validation::{validate_workflow, ValidationError};
