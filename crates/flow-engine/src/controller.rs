//! Execution controller
//!
//! Runs one workflow invocation start to finish:
//!
//! 1. validate the graph and build the forward/recovery plan
//! 2. walk the forward plan one node at a time, routing, assembling input
//!    and dispatching, persisting the growing log after every node
//! 3. on the first node failure, run the recovery plan with a synthesized
//!    error description and stop forward processing
//! 4. finalize the record with a never-null output
//!
//! Node failures are data in the response; only request-level problems
//! (unknown workflow, broken graph) come back as [`EngineError`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::catalog::WorkflowCatalog;
use crate::config::EngineConfig;
use crate::context::{wants_conversation, NodeContext};
use crate::core_handlers::unwrap_branch_envelope;
use crate::error::{EngineError, NodeError, Result};
use crate::events::{EventSink, NullEventSink, WorkflowEvent};
use crate::execution::{Execution, ExecutionLog, ExecutionStatus, RunRequest, RunResponse};
use crate::extensions::ExecutorExtensions;
use crate::memory::ConversationMemory;
use crate::registry::{NodeDispatcher, NodeRegistry};
use crate::router::{route, BranchResults, RouteDecision};
use crate::scheduler::build_plan;
use crate::store::ExecutionStore;
use crate::types::{GraphIndex, NodeId, NodeKind, Workflow, WorkflowEdge, WorkflowNode};
use crate::validation::ensure_structurally_valid;

/// Output-store key holding the run's triggering payload
pub const TRIGGER_OUTPUT_KEY: &str = "__trigger__";

/// Orchestrates workflow runs against a catalog, registry and store
pub struct ExecutionController {
    catalog: Arc<WorkflowCatalog>,
    dispatcher: NodeDispatcher,
    store: Arc<dyn ExecutionStore>,
    memory: Option<Arc<dyn ConversationMemory>>,
    extensions: Arc<ExecutorExtensions>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

/// Per-run bookkeeping, discarded when the run ends
struct RunState<'w> {
    index: GraphIndex<'w>,
    ctx: NodeContext,
    trigger_input: Value,
    /// Node id → last output; also holds the trigger payload
    outputs: HashMap<NodeId, Value>,
    branches: BranchResults,
    final_output: Value,
    last_non_null: Option<Value>,
    logs: Vec<ExecutionLog>,
}

enum Step {
    Skipped,
    Succeeded(Value),
    Failed(NodeError),
}

impl ExecutionController {
    pub fn new(
        catalog: Arc<WorkflowCatalog>,
        registry: Arc<NodeRegistry>,
        store: Arc<dyn ExecutionStore>,
    ) -> Self {
        Self {
            catalog,
            dispatcher: NodeDispatcher::new(registry),
            store,
            memory: None,
            extensions: Arc::new(ExecutorExtensions::new()),
            events: Arc::new(NullEventSink),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &NodeRegistry {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch a persisted execution record
    pub async fn execution(&self, id: &str) -> Result<Execution> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(id.to_string()))
    }

    /// Run a catalog workflow
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse> {
        if request.workflow_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("workflowId is required".to_string()));
        }
        let workflow = self
            .catalog
            .get(&request.workflow_id)
            .ok_or_else(|| EngineError::WorkflowNotFound(request.workflow_id.clone()))?;

        self.execute(&workflow, request.execution_id, request.input)
            .await
    }

    /// Run a workflow that is not necessarily in the catalog
    pub async fn execute(
        &self,
        workflow: &Workflow,
        execution_id: Option<String>,
        input: Value,
    ) -> Result<RunResponse> {
        ensure_structurally_valid(workflow)?;
        let plan = build_plan(workflow)?;

        let mut execution = self.open_execution(workflow, execution_id, &input).await?;
        log::info!(
            "Starting execution {} of workflow '{}' ({} nodes, {} recovery)",
            execution.id,
            workflow.id,
            plan.forward.len(),
            plan.recovery.len()
        );
        self.emit(WorkflowEvent::ExecutionStarted {
            workflow_id: workflow.id.clone(),
            execution_id: execution.id.clone(),
        });

        let ctx = NodeContext::new(&workflow.id, &execution.id)
            .with_user(workflow.user_id.clone())
            .with_memory(self.memory.clone())
            .with_extensions(self.extensions.clone());

        let mut outputs = HashMap::new();
        outputs.insert(TRIGGER_OUTPUT_KEY.to_string(), input.clone());
        let mut run = RunState {
            index: GraphIndex::new(workflow),
            ctx,
            trigger_input: input.clone(),
            outputs,
            branches: BranchResults::new(),
            final_output: input.clone(),
            last_non_null: None,
            logs: Vec::new(),
        };

        let mut failure: Option<(&WorkflowNode, NodeError)> = None;
        for node_id in &plan.forward {
            let Some(node) = run.index.node(node_id) else {
                continue;
            };
            let fallback = run.trigger_input.clone();
            if let Step::Failed(error) = self.step(&mut run, node, &fallback, None).await {
                failure = Some((node, error));
                break;
            }
        }

        let error_message = match &failure {
            Some((node, error)) => {
                let message = format!("Node '{}' failed: {}", node.display_name(), error);
                if plan.has_recovery() {
                    self.recover(&mut run, &plan.recovery, node, error).await;
                }
                Some(message)
            }
            None => None,
        };

        let output = if run.final_output.is_null() {
            run.last_non_null
                .take()
                .unwrap_or_else(|| run.trigger_input.clone())
        } else {
            run.final_output
        };

        let status = if error_message.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Success
        };
        execution.logs = run.logs;
        execution.finish(status, output, error_message);

        if let Err(e) = self.store.finalize(&execution).await {
            log::warn!("Failed to persist final state of execution {}: {}", execution.id, e);
        }

        let response = RunResponse::from(&execution);
        log::info!(
            "Execution {} of workflow '{}' finished: {} in {}ms",
            execution.id,
            workflow.id,
            status.as_str(),
            response.duration_ms
        );
        self.emit(WorkflowEvent::ExecutionCompleted {
            workflow_id: workflow.id.clone(),
            execution_id: execution.id.clone(),
            status,
            duration_ms: response.duration_ms,
        });

        Ok(response)
    }

    /// Create the execution record, or attach to one allocated upstream
    async fn open_execution(
        &self,
        workflow: &Workflow,
        execution_id: Option<String>,
        input: &Value,
    ) -> Result<Execution> {
        let Some(id) = execution_id.filter(|id| !id.trim().is_empty()) else {
            let execution = Execution::new(uuid::Uuid::new_v4().to_string(), &workflow.id, input.clone());
            self.persist_new(&execution).await;
            return Ok(execution);
        };

        let existing = match self.store.get(&id).await {
            Ok(existing) => existing,
            Err(e) if e.is_client_error() => return Err(e),
            Err(e) => {
                log::warn!("Could not load execution {}: {}; starting a new record", id, e);
                None
            }
        };

        match existing {
            Some(record) if record.workflow_id != workflow.id => Err(EngineError::InvalidRequest(
                format!(
                    "execution {} belongs to workflow '{}'",
                    id, record.workflow_id
                ),
            )),
            Some(record) if record.status.is_terminal() => Err(EngineError::InvalidRequest(
                format!("execution {} has already finished", id),
            )),
            Some(mut record) => {
                log::debug!("Attaching to pre-allocated execution {}", id);
                record.input = input.clone();
                record.logs.clear();
                record.started_at = Utc::now();
                if let Err(e) = self
                    .store
                    .update_progress(&record.id, &record.logs, ExecutionStatus::Running)
                    .await
                {
                    log::warn!("Failed to reset execution {}: {}", record.id, e);
                }
                Ok(record)
            }
            None => {
                let execution = Execution::new(id, &workflow.id, input.clone());
                self.persist_new(&execution).await;
                Ok(execution)
            }
        }
    }

    async fn persist_new(&self, execution: &Execution) {
        if let Err(e) = self.store.create(execution).await {
            log::warn!("Failed to create execution record {}: {}", execution.id, e);
        }
    }

    /// Route, dispatch and record a single node
    ///
    /// `forced_input` bypasses routing; the recovery path uses it to hand
    /// error triggers their synthesized input.
    async fn step(
        &self,
        run: &mut RunState<'_>,
        node: &WorkflowNode,
        fallback: &Value,
        forced_input: Option<Value>,
    ) -> Step {
        let execution_id = run.ctx.execution_id.clone();

        let input = match forced_input {
            Some(input) => input,
            None => match route(&node.id, &run.index, &run.branches) {
                RouteDecision::Skip => {
                    run.logs.push(ExecutionLog::skipped(node));
                    self.emit(WorkflowEvent::NodeSkipped {
                        execution_id,
                        node_id: node.id.clone(),
                    });
                    self.persist_progress(run).await;
                    return Step::Skipped;
                }
                RouteDecision::Run { valid_edges } => {
                    assemble_input(&valid_edges, &run.outputs, &run.index, fallback)
                }
            },
        };

        let ctx = self.context_for(node, &run.ctx).await;
        let mut log_entry = ExecutionLog::started(node, input.clone());
        self.emit(WorkflowEvent::NodeStarted {
            execution_id: execution_id.clone(),
            node_id: node.id.clone(),
        });

        match self.dispatcher.dispatch(node, input.clone(), &ctx).await {
            Ok(mut output) => {
                let kind = node.kind();
                if kind.is_trigger() && is_empty_output(&output) {
                    output = input;
                }
                record_branch(kind, &node.id, &output, &mut run.branches);

                run.outputs.insert(node.id.clone(), output.clone());
                if !output.is_null() {
                    run.last_non_null = Some(output.clone());
                }
                run.final_output = output.clone();

                log::debug!("Node '{}' ({}) succeeded", node.id, node.node_type);
                log_entry.succeed(output.clone());
                run.logs.push(log_entry);
                self.emit(WorkflowEvent::NodeCompleted {
                    execution_id,
                    node_id: node.id.clone(),
                    output: output.clone(),
                });
                self.persist_progress(run).await;
                Step::Succeeded(output)
            }
            Err(error) => {
                log::warn!("Node '{}' ({}) failed: {}", node.id, node.node_type, error);
                log_entry.fail(error.to_string());
                run.logs.push(log_entry);
                self.emit(WorkflowEvent::NodeFailed {
                    execution_id,
                    node_id: node.id.clone(),
                    error: error.to_string(),
                });
                self.persist_progress(run).await;
                Step::Failed(error)
            }
        }
    }

    /// Run the error-handling branch after `failed` raised `error`
    ///
    /// Failures here are logged and never escalate. The last successful
    /// error-trigger output becomes the run's final output.
    async fn recover(
        &self,
        run: &mut RunState<'_>,
        recovery: &[NodeId],
        failed: &WorkflowNode,
        error: &NodeError,
    ) {
        self.emit(WorkflowEvent::RecoveryStarted {
            execution_id: run.ctx.execution_id.clone(),
            failed_node_id: failed.id.clone(),
            nodes: recovery.to_vec(),
        });

        let error_input = error_input(failed, error, &run.final_output, &run.ctx);
        let mut adopted: Option<Value> = None;

        for node_id in recovery {
            let Some(node) = run.index.node(node_id) else {
                continue;
            };
            let is_error_trigger = node.kind() == NodeKind::ErrorTrigger;
            let forced = is_error_trigger.then(|| error_input.clone());

            match self.step(run, node, &error_input, forced).await {
                Step::Succeeded(output) if is_error_trigger => adopted = Some(output),
                Step::Failed(e) => {
                    log::warn!("Error handler '{}' failed: {}", node.id, e);
                }
                _ => {}
            }
        }

        if let Some(output) = adopted {
            run.final_output = output;
        }
    }

    /// Derive the node's context and load its conversation history
    async fn context_for(&self, node: &WorkflowNode, base: &NodeContext) -> NodeContext {
        let mut ctx = base.for_node(node);
        if !wants_conversation(node) {
            return ctx;
        }
        let Some(memory) = ctx.memory.clone() else {
            return ctx;
        };

        let requested = node.config_u64("memorySize").map(|n| n as usize);
        let limit = self.config.memory_limit(requested);
        if limit == 0 {
            return ctx;
        }
        match memory.history(&ctx.session_key, limit).await {
            Ok(turns) => ctx.conversation = turns,
            Err(e) => log::warn!(
                "Could not load conversation '{}' for node '{}': {}",
                ctx.session_key,
                node.id,
                e
            ),
        }
        ctx
    }

    async fn persist_progress(&self, run: &RunState<'_>) {
        let id = &run.ctx.execution_id;
        if let Err(e) = self
            .store
            .update_progress(id, &run.logs, ExecutionStatus::Running)
            .await
        {
            log::warn!("Failed to persist progress of execution {}: {}", id, e);
        }
    }

    fn emit(&self, event: WorkflowEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("Dropped workflow event: {}", e);
        }
    }
}

/// Build a node's input from its live incoming edges
///
/// Only sources that stored an output count. None → `fallback`; one → that
/// output; several → an object keyed by source id in edge order. Output
/// from an if/else or switch source is replaced by the input it wrapped.
pub fn assemble_input(
    valid_edges: &[&WorkflowEdge],
    outputs: &HashMap<NodeId, Value>,
    index: &GraphIndex<'_>,
    fallback: &Value,
) -> Value {
    let mut sources: Vec<(&str, Value)> = Vec::new();
    for edge in valid_edges {
        if sources.iter().any(|(id, _)| *id == edge.source) {
            continue;
        }
        if let Some(output) = outputs.get(&edge.source) {
            let kind = index
                .node(&edge.source)
                .map(WorkflowNode::kind)
                .unwrap_or(NodeKind::Action);
            sources.push((edge.source.as_str(), unwrap_branch_envelope(kind, output.clone())));
        }
    }

    match sources.len() {
        0 => fallback.clone(),
        1 => sources.pop().map(|(_, value)| value).unwrap_or(Value::Null),
        _ => {
            let map: Map<String, Value> = sources
                .into_iter()
                .map(|(id, value)| (id.to_string(), value))
                .collect();
            Value::Object(map)
        }
    }
}

/// The description handed to error triggers
fn error_input(
    failed: &WorkflowNode,
    error: &NodeError,
    last_output: &Value,
    ctx: &NodeContext,
) -> Value {
    let mut map = Map::new();
    map.insert("failedNodeId".to_string(), Value::String(failed.id.clone()));
    map.insert(
        "failedNodeName".to_string(),
        Value::String(failed.display_name().to_string()),
    );
    map.insert("errorMessage".to_string(), Value::String(error.to_string()));
    map.insert("errorStack".to_string(), Value::String(format!("{:?}", error)));
    map.insert("lastOutput".to_string(), last_output.clone());
    if let Value::Object(identity) = ctx.identity() {
        map.extend(identity);
    }
    map.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
    Value::Object(map)
}

fn is_empty_output(output: &Value) -> bool {
    match output {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Record an if/else or switch decision from its output envelope
fn record_branch(kind: NodeKind, node_id: &str, output: &Value, branches: &mut BranchResults) {
    match kind {
        NodeKind::IfElse => {
            if let Some(condition) = output.get("condition").and_then(|c| c.as_bool()) {
                branches.record_if_else(node_id, condition);
            }
        }
        NodeKind::Switch => {
            let matched = match output.get("matchedCase") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::Bool(b)) => Some(b.to_string()),
                _ => None,
            };
            branches.record_switch(node_id, matched);
        }
        _ => {}
    }
}
