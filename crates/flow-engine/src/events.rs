//! Event types for streaming run progress
//!
//! The controller reports each step of a run to an [`EventSink`]. A failed
//! send never affects the run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::ExecutionStatus;

/// Trait for sending workflow events
///
/// This abstracts over the transport (channel, log, collector) so the
/// controller can be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g. channel closed)
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        workflow_id: String,
        execution_id: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: String,
        node_id: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: String,
        node_id: String,
        output: Value,
    },

    /// Every incoming branch edge was invalid
    #[serde(rename_all = "camelCase")]
    NodeSkipped {
        execution_id: String,
        node_id: String,
    },

    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: String,
        node_id: String,
        error: String,
    },

    /// A node failed and the error-handling branch is about to run
    #[serde(rename_all = "camelCase")]
    RecoveryStarted {
        execution_id: String,
        failed_node_id: String,
        nodes: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    ExecutionCompleted {
        workflow_id: String,
        execution_id: String,
        status: ExecutionStatus,
        duration_ms: u64,
    },
}

impl WorkflowEvent {
    /// The execution this event belongs to
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeSkipped { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::RecoveryStarted { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. } => execution_id,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for tests that check which events were emitted.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events to the `log` facade
///
/// Run boundaries go to info, node steps to debug, failures to warn.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        match &event {
            WorkflowEvent::ExecutionStarted {
                workflow_id,
                execution_id,
            } => log::info!("Execution {} of '{}' started", execution_id, workflow_id),
            WorkflowEvent::NodeStarted {
                execution_id,
                node_id,
            } => log::debug!("[{}] node '{}' started", execution_id, node_id),
            WorkflowEvent::NodeCompleted {
                execution_id,
                node_id,
                ..
            } => log::debug!("[{}] node '{}' completed", execution_id, node_id),
            WorkflowEvent::NodeSkipped {
                execution_id,
                node_id,
            } => log::debug!("[{}] node '{}' skipped", execution_id, node_id),
            WorkflowEvent::NodeFailed {
                execution_id,
                node_id,
                error,
            } => log::warn!("[{}] node '{}' failed: {}", execution_id, node_id, error),
            WorkflowEvent::RecoveryStarted {
                execution_id,
                failed_node_id,
                nodes,
            } => log::warn!(
                "[{}] running {} error handler(s) after '{}' failed",
                execution_id,
                nodes.len(),
                failed_node_id
            ),
            WorkflowEvent::ExecutionCompleted {
                workflow_id,
                execution_id,
                status,
                duration_ms,
            } => log::info!(
                "Execution {} of '{}' finished as {} in {}ms",
                execution_id,
                workflow_id,
                status.as_str(),
                duration_ms
            ),
        }
        Ok(())
    }
}
