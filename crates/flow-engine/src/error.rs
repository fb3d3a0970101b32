//! Error types for the flow engine
//!
//! Two layers: [`EngineError`] covers request-level and graph-level
//! failures that stop a run before (or instead of) node execution, and
//! [`NodeError`] is what a single node handler reports. Node errors are
//! caught by the controller and turned into `failed` log entries.

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the engine itself
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph contains at least one cycle
    #[error("Workflow graph contains a cycle through nodes: {}", .nodes.join(", "))]
    GraphCycle { nodes: Vec<String> },

    /// Structural problems (duplicate ids, dangling edges)
    #[error("Invalid workflow graph: {}", .0.join("; "))]
    InvalidGraph(Vec<String>),

    /// Requested workflow does not exist
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Requested execution record does not exist
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// The invocation itself was malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a storage error with a message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether this error was caused by the caller rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::GraphCycle { .. }
                | Self::InvalidGraph(_)
                | Self::WorkflowNotFound(_)
                | Self::ExecutionNotFound(_)
                | Self::InvalidRequest(_)
        )
    }
}

/// Errors reported by node handlers
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// Missing or malformed required config field
    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    /// Structured config could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A called service answered with a non-success status
    #[error("{service} returned {status}: {hint}{}", body_suffix(.body))]
    ExternalService {
        service: String,
        status: u16,
        hint: String,
        body: Option<String>,
    },

    /// A bounded wait was exceeded
    #[error("Timed out: {0}")]
    Timeout(String),

    /// No handler is registered for the node type
    #[error("Unsupported node type '{0}'")]
    UnsupportedType(String),

    /// Catch-all execution failure
    #[error("{0}")]
    Execution(String),
}

fn body_suffix(body: &Option<String>) -> String {
    match body {
        Some(b) if !b.is_empty() => format!(" ({})", b),
        _ => String::new(),
    }
}

impl NodeError {
    /// Create a validation error for a config field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a validation error for a required field that is absent
    pub fn missing(field: impl Into<String>) -> Self {
        Self::validation(field, "required field is missing")
    }

    /// Create a generic execution failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Attach the name of the node that raised a validation error
    pub fn for_node(self, node_name: &str) -> Self {
        match self {
            Self::Validation { field, message } => Self::Validation {
                field,
                message: format!("{} (node '{}')", message, node_name),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_lists_nodes() {
        let err = EngineError::GraphCycle {
            nodes: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Workflow graph contains a cycle through nodes: a, b"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_validation_error_names_field_and_node() {
        let err = NodeError::missing("url").for_node("Fetch orders");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'url': required field is missing (node 'Fetch orders')"
        );
    }

    #[test]
    fn test_external_service_display() {
        let err = NodeError::ExternalService {
            service: "HTTP".to_string(),
            status: 404,
            hint: "Resource not found, check the URL".to_string(),
            body: Some("no such page".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "HTTP returned 404: Resource not found, check the URL (no such page)"
        );
    }

    #[test]
    fn test_storage_is_not_client_error() {
        assert!(!EngineError::storage("disk full").is_client_error());
    }
}
