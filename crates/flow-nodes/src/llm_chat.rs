//! Conversation-aware chat completion against an OpenAI-compatible server

use std::time::Duration;

use async_trait::async_trait;
use flow_engine::{
    ConversationTurn, EngineConfig, NodeContext, NodeError, NodeHandler, Role, WorkflowNode,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::{self, RetryPolicy};
use crate::resolved_config;

/// Local llama.cpp / vLLM style server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LlmChatConfig {
    base_url: String,
    model: String,
    system_prompt: Option<String>,
    prompt: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl Default for LlmChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "default".to_string(),
            system_prompt: None,
            prompt: None,
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends history plus the resolved prompt to `/chat/completions`
///
/// The prompt defaults to the input itself: a string is used as-is, a
/// chat-trigger payload contributes its `message`.
pub struct LlmChatHandler {
    policy: RetryPolicy,
    timeout: Duration,
}

impl LlmChatHandler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(config),
            timeout: config.http_timeout(),
        }
    }
}

fn default_prompt(input: &Value) -> Option<String> {
    match input {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["message", "prompt", "text"]
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string),
        _ => None,
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl NodeHandler for LlmChatHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: LlmChatConfig = resolved_config(node, &input)?;

        let prompt = config
            .prompt
            .or_else(|| default_prompt(&input))
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| NodeError::missing("prompt"))?;

        let mut messages = Vec::with_capacity(ctx.conversation.len() + 2);
        if let Some(system) = config.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in &ctx.conversation {
            messages.push(json!({"role": role_name(turn.role), "content": turn.content}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let request_body = json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": false,
        });

        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        let client = http::client_for(ctx, self.timeout)?;
        let api_key = ctx.credential("apiKey");

        log::debug!(
            "LLM chat request to {} with {} history turns (node '{}')",
            url,
            ctx.conversation.len(),
            node.display_name()
        );

        let response = http::send_with_retry("LLM", self.policy, || {
            let request = client.post(&url).timeout(self.timeout).json(&request_body);
            match api_key {
                Some(key) => request.bearer_auth(key),
                None => request,
            }
        })
        .await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NodeError::failed(format!("Failed to parse LLM response: {}", e)))?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| NodeError::failed("LLM response contained no message"))?;

        if let Some(memory) = &ctx.memory {
            let turns = vec![
                ConversationTurn::user(prompt),
                ConversationTurn::assistant(reply.clone()),
            ];
            if let Err(e) = memory.append(&ctx.session_key, turns).await {
                log::warn!(
                    "Failed to store conversation for session '{}': {}",
                    ctx.session_key,
                    e
                );
            }
        }

        Ok(json!({
            "response": reply,
            "model": parsed.model.unwrap_or(config.model),
            "usage": parsed.usage,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use axum::routing::post;
    use axum::{Json, Router};
    use flow_engine::{ConversationMemory, InMemoryConversationMemory};
    use std::sync::Arc;

    /// Replies with the number of messages received and the last one
    fn echo_server() -> Router {
        Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let messages = body["messages"].as_array().cloned().unwrap_or_default();
                let last = messages
                    .last()
                    .and_then(|m| m["content"].as_str())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "model": "echo-1",
                    "choices": [{"message": {"role": "assistant", "content": format!("{}:{}", messages.len(), last)}}],
                    "usage": {"total_tokens": 3},
                }))
            }),
        )
    }

    fn chat_node(base: &str) -> WorkflowNode {
        let mut node = WorkflowNode::new("chat", "llm-chat");
        node.category = "ai".to_string();
        node.config = json!({
            "baseUrl": format!("{}/v1", base),
            "systemPrompt": "Be brief",
            "prompt": "Hello {{input.name}}",
        });
        node
    }

    #[tokio::test]
    async fn test_sends_history_and_stores_exchange() {
        let base = test_server::spawn(echo_server()).await;
        let memory = Arc::new(InMemoryConversationMemory::new(10));
        memory
            .append(
                "session-1",
                vec![ConversationTurn::user("hi"), ConversationTurn::assistant("hey")],
            )
            .await
            .unwrap();

        let mut ctx = NodeContext::new("wf", "ex").with_memory(Some(memory.clone()));
        ctx.session_key = "session-1".to_string();
        ctx.conversation = memory.history("session-1", 10).await.unwrap();

        let output = LlmChatHandler::new(&EngineConfig::default())
            .execute(&chat_node(&base), json!({"name": "Ada"}), &ctx)
            .await
            .unwrap();

        // system + two history turns + prompt
        assert_eq!(output["response"], "4:Hello Ada");
        assert_eq!(output["model"], "echo-1");
        assert_eq!(output["usage"]["total_tokens"], 3);
        assert_eq!(memory.session_len("session-1"), 4);
    }

    #[tokio::test]
    async fn test_prompt_falls_back_to_chat_message() {
        let base = test_server::spawn(echo_server()).await;
        let mut node = chat_node(&base);
        node.config = json!({"baseUrl": format!("{}/v1", base)});

        let output = LlmChatHandler::new(&EngineConfig::default())
            .execute(&node, json!({"message": "What time is it?"}), &NodeContext::new("wf", "ex"))
            .await
            .unwrap();
        assert_eq!(output["response"], "1:What time is it?");
    }

    #[tokio::test]
    async fn test_missing_prompt_is_rejected() {
        let node = WorkflowNode::new("chat", "llm-chat");
        let err = LlmChatHandler::new(&EngineConfig::default())
            .execute(&node, json!({"count": 3}), &NodeContext::new("wf", "ex"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation { ref field, .. } if field == "prompt"));
    }
}
