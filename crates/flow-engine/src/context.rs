//! Shared context handed to every node handler

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::extensions::ExecutorExtensions;
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::types::WorkflowNode;

/// Config fields that are treated as credentials when present at top level
const CREDENTIAL_FIELDS: &[&str] = &["apiKey", "token", "authorization"];

/// Run identity, injected collaborators, and per-node credentials
#[derive(Clone)]
pub struct NodeContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub user_id: Option<String>,
    /// Prior turns for conversational nodes, oldest first
    pub conversation: Vec<ConversationTurn>,
    /// Key under which conversation turns are stored
    pub session_key: String,
    pub credentials: HashMap<String, String>,
    pub memory: Option<Arc<dyn ConversationMemory>>,
    pub extensions: Arc<ExecutorExtensions>,
}

impl NodeContext {
    pub fn new(workflow_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        let workflow_id = workflow_id.into();
        Self {
            session_key: default_session_key(&workflow_id, None),
            workflow_id,
            execution_id: execution_id.into(),
            user_id: None,
            conversation: Vec::new(),
            credentials: HashMap::new(),
            memory: None,
            extensions: Arc::new(ExecutorExtensions::new()),
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.session_key = default_session_key(&self.workflow_id, user_id.as_deref());
        self.user_id = user_id;
        self
    }

    pub fn with_memory(mut self, memory: Option<Arc<dyn ConversationMemory>>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<ExecutorExtensions>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Derive the context for one node: credentials and session key come from its config
    pub fn for_node(&self, node: &WorkflowNode) -> Self {
        let mut ctx = self.clone();
        ctx.credentials = extract_credentials(&node.config);
        ctx.conversation = Vec::new();
        if let Some(key) = node.config_str("sessionKey").filter(|k| !k.trim().is_empty()) {
            ctx.session_key = key.to_string();
        }
        ctx
    }

    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name).map(|s| s.as_str())
    }

    /// The run identity as a JSON object
    pub fn identity(&self) -> Value {
        serde_json::json!({
            "workflowId": self.workflow_id,
            "executionId": self.execution_id,
            "userId": self.user_id,
        })
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // credential values are never printed
        f.debug_struct("NodeContext")
            .field("workflow_id", &self.workflow_id)
            .field("execution_id", &self.execution_id)
            .field("user_id", &self.user_id)
            .field("conversation_turns", &self.conversation.len())
            .field("session_key", &self.session_key)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .field("has_memory", &self.memory.is_some())
            .field("extensions", &self.extensions)
            .finish()
    }
}

fn default_session_key(workflow_id: &str, user_id: Option<&str>) -> String {
    format!("{}:{}", workflow_id, user_id.unwrap_or("anonymous"))
}

/// Collect credentials from a node config
///
/// Reads string entries of a `credentials` object plus the top-level
/// `apiKey`, `token` and `authorization` fields. Empty values are ignored.
pub fn extract_credentials(config: &Value) -> HashMap<String, String> {
    let mut credentials = HashMap::new();

    if let Some(map) = config.get("credentials").and_then(|c| c.as_object()) {
        for (key, value) in map {
            if let Some(s) = value.as_str().filter(|s| !s.is_empty()) {
                credentials.insert(key.clone(), s.to_string());
            }
        }
    }

    for field in CREDENTIAL_FIELDS {
        if let Some(s) = config.get(*field).and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
            credentials.insert(field.to_string(), s.to_string());
        }
    }

    credentials
}

/// Whether a node should receive conversation history
pub fn wants_conversation(node: &WorkflowNode) -> bool {
    node.category.eq_ignore_ascii_case("ai") || node.node_type == "llm-chat"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_credentials() {
        let config = json!({
            "credentials": {"clientId": "abc", "empty": "", "nested": {"x": 1}},
            "apiKey": "sk-123",
            "token": "",
            "url": "https://example.com"
        });

        let creds = extract_credentials(&config);
        assert_eq!(creds.len(), 2);
        assert_eq!(creds.get("clientId").map(String::as_str), Some("abc"));
        assert_eq!(creds.get("apiKey").map(String::as_str), Some("sk-123"));
    }

    #[test]
    fn test_for_node_scopes_credentials_and_session() {
        let base = NodeContext::new("wf-1", "exec-1").with_user(Some("u-1".to_string()));
        assert_eq!(base.session_key, "wf-1:u-1");

        let mut node = WorkflowNode::new("chat", "llm-chat");
        node.config = json!({"apiKey": "secret", "sessionKey": "support-42"});

        let ctx = base.for_node(&node);
        assert_eq!(ctx.credential("apiKey"), Some("secret"));
        assert_eq!(ctx.session_key, "support-42");
        assert!(base.credential("apiKey").is_none());
        assert!(!format!("{:?}", ctx).contains("secret"));
    }

    #[test]
    fn test_wants_conversation() {
        let mut node = WorkflowNode::new("n", "summarize");
        assert!(!wants_conversation(&node));
        node.category = "AI".to_string();
        assert!(wants_conversation(&node));
        assert!(wants_conversation(&WorkflowNode::new("c", "llm-chat")));
    }

    #[test]
    fn test_identity_object() {
        let ctx = NodeContext::new("wf", "ex");
        assert_eq!(
            ctx.identity(),
            json!({"workflowId": "wf", "executionId": "ex", "userId": null})
        );
    }
}
