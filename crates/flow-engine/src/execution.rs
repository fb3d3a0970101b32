//! Execution records
//!
//! An [`Execution`] is the persisted trace of one run. Only the controller
//! mutates it; once its status leaves `running` it is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::WorkflowNode;

/// Status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// Status of one node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

/// One entry per visited node, appended in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub node_id: String,
    pub node_name: String,
    pub status: LogStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionLog {
    /// Start an entry for a node that is about to run
    pub fn started(node: &WorkflowNode, input: Value) -> Self {
        Self {
            node_id: node.id.clone(),
            node_name: node.display_name().to_string(),
            status: LogStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            input: Some(input),
            output: None,
            error: None,
        }
    }

    /// Entry for a node the router skipped; carries no input or output
    pub fn skipped(node: &WorkflowNode) -> Self {
        let now = Utc::now();
        Self {
            node_id: node.id.clone(),
            node_name: node.display_name().to_string(),
            status: LogStatus::Skipped,
            started_at: now,
            finished_at: Some(now),
            input: None,
            output: None,
            error: None,
        }
    }

    pub fn succeed(&mut self, output: Value) {
        self.status = LogStatus::Success;
        self.finished_at = Some(Utc::now());
        self.output = Some(output);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = LogStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// The persisted record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<ExecutionLog>,
}

impl Execution {
    /// A fresh record in the `running` state
    pub fn new(id: impl Into<String>, workflow_id: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            input,
            output: Value::Null,
            error: None,
            logs: Vec::new(),
        }
    }

    /// Move to a terminal status, stamping the finish time and duration
    pub fn finish(&mut self, status: ExecutionStatus, output: Value, error: Option<String>) {
        let finished_at = Utc::now();
        self.duration_ms = Some(
            (finished_at - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.finished_at = Some(finished_at);
        self.status = status;
        self.output = output;
        self.error = error;
    }
}

/// A request to run a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub workflow_id: String,
    /// Attach to a record an upstream receiver already allocated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub input: Value,
}

impl RunRequest {
    pub fn new(workflow_id: impl Into<String>, input: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: None,
            input,
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// What a run returns to its caller
///
/// A failed run is still a response; only request-level problems are errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub output: Value,
    pub logs: Vec<ExecutionLog>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Execution> for RunResponse {
    fn from(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id.clone(),
            status: execution.status,
            output: execution.output.clone(),
            logs: execution.logs.clone(),
            duration_ms: execution.duration_ms.unwrap_or(0),
            error: execution.error.clone(),
        }
    }
}
