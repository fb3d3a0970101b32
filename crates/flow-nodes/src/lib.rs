//! External-action node handlers for flow-engine
//!
//! HTTP calls, messaging webhooks and OpenAI-compatible chat completion,
//! all behind the engine's [`flow_engine::NodeHandler`] contract. Hosts call
//! [`register_builtins`] (or [`builtin_registry`]) once at startup and
//! [`setup_extensions`] to share a single HTTP client between runs.

pub mod http;
pub mod http_request;
pub mod llm_chat;
pub mod webhook;

use std::sync::Arc;

use flow_engine::{
    extension_keys, template, EngineConfig, ExecutorExtensions, NodeDescriptor, NodeError,
    NodeRegistry, WorkflowNode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use http::{status_hint, RetryPolicy};
pub use http_request::HttpRequestHandler;
pub use llm_chat::LlmChatHandler;
pub use webhook::WebhookSendHandler;

/// Register the external-action handlers
pub fn register_builtins(registry: &mut NodeRegistry, config: &EngineConfig) {
    registry.register(
        NodeDescriptor::new("http-request", "action", "HTTP Request")
            .with_description("Calls a URL and returns status, headers and body"),
        Arc::new(HttpRequestHandler::new(config)),
    );
    registry.register(
        NodeDescriptor::new("webhook-send", "action", "Send Webhook Message")
            .with_description("Posts a message to a Slack or Discord webhook"),
        Arc::new(WebhookSendHandler::new(config)),
    );
    registry.register(
        NodeDescriptor::new("llm-chat", "ai", "LLM Chat")
            .with_description("Chat completion with conversation memory"),
        Arc::new(LlmChatHandler::new(config)),
    );
}

/// Core control-flow and transform handlers plus every external action
pub fn builtin_registry(config: &EngineConfig) -> NodeRegistry {
    let mut registry = NodeRegistry::with_core_handlers(config);
    register_builtins(&mut registry, config);
    registry
}

/// Insert the shared HTTP client used by every handler in this crate
///
/// Handlers fall back to a per-call client when the host skips this.
pub fn setup_extensions(
    extensions: &mut ExecutorExtensions,
    config: &EngineConfig,
) -> Result<(), NodeError> {
    if extensions.has(extension_keys::HTTP_CLIENT) {
        return Ok(());
    }
    let client = http::build_client(config.http_timeout())?;
    extensions.set(extension_keys::HTTP_CLIENT, client);
    log::debug!("Shared HTTP client registered");
    Ok(())
}

/// Resolve `{{input.*}}` templates in a node's config, then deserialize it
pub(crate) fn resolved_config<T: DeserializeOwned>(
    node: &WorkflowNode,
    input: &Value,
) -> Result<T, NodeError> {
    let resolved = template::resolve_config(&node.config, input);
    serde_json::from_value(resolved)
        .map_err(|e| NodeError::Config(format!("{} config: {}", node.node_type, e)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use flow_engine::{
        ExecutionController, ExecutionStatus, InMemoryExecutionStore, RunRequest,
        WorkflowBuilder, WorkflowCatalog,
    };
    use serde_json::json;

    #[test]
    fn test_builtin_registry_has_core_and_actions() {
        let registry = builtin_registry(&EngineConfig::default());
        for node_type in ["manual-trigger", "if-else", "http-request", "webhook-send", "llm-chat"] {
            assert!(registry.has_node_type(node_type), "missing {}", node_type);
        }
        assert_eq!(registry.descriptor("llm-chat").unwrap().category, "ai");
    }

    #[test]
    fn test_setup_extensions_is_idempotent() {
        let mut extensions = ExecutorExtensions::new();
        setup_extensions(&mut extensions, &EngineConfig::default()).unwrap();
        setup_extensions(&mut extensions, &EngineConfig::default()).unwrap();
        assert!(extensions
            .get::<reqwest::Client>(extension_keys::HTTP_CLIENT)
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_request_reaches_error_trigger() {
        let mut config = EngineConfig::default();
        config.http_retries = 1;

        let workflow = WorkflowBuilder::new("wf-http", "HTTP with recovery")
            .add_node("start", "manual-trigger")
            .add_node("call", "http-request")
            .with_config(json!({"url": "not-a-url"}))
            .add_node("on-error", "error-trigger")
            .connect("start", "call")
            .build();
        let catalog = Arc::new(WorkflowCatalog::new());
        catalog.insert(workflow).unwrap();

        let mut extensions = ExecutorExtensions::new();
        setup_extensions(&mut extensions, &config).unwrap();
        let controller = ExecutionController::new(
            catalog,
            Arc::new(builtin_registry(&config)),
            Arc::new(InMemoryExecutionStore::new()),
        )
        .with_config(config)
        .with_extensions(extensions);

        let response = controller
            .run(RunRequest::new("wf-http", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status, ExecutionStatus::Failed);
        assert_eq!(response.output["failedNodeId"], "call");
        assert!(response.output["errorMessage"]
            .as_str()
            .unwrap()
            .contains("must start with http"));
    }
}
