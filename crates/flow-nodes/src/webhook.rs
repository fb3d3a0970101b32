//! Messaging webhook delivery (Slack and Discord incoming webhooks)

use std::time::Duration;

use async_trait::async_trait;
use flow_engine::{EngineConfig, NodeContext, NodeError, NodeHandler, WorkflowNode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::http::{self, RetryPolicy};
use crate::resolved_config;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WebhookConfig {
    url: Option<String>,
    text: Option<String>,
    content: Option<String>,
    username: Option<String>,
}

/// Posts a text message to an incoming-webhook URL
///
/// The payload carries the message as both `text` (Slack) and `content`
/// (Discord) so either service accepts it unchanged.
pub struct WebhookSendHandler {
    policy: RetryPolicy,
    timeout: Duration,
}

impl WebhookSendHandler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(config),
            timeout: config.http_timeout(),
        }
    }
}

#[async_trait]
impl NodeHandler for WebhookSendHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: WebhookConfig = resolved_config(node, &input)?;

        let url = config
            .url
            .or_else(|| ctx.credential("webhookUrl").map(str::to_string))
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| NodeError::missing("url"))?;
        let message = config
            .text
            .or(config.content)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| NodeError::missing("text"))?;

        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(message.clone()));
        payload.insert("content".to_string(), Value::String(message));
        if let Some(username) = config.username.filter(|u| !u.is_empty()) {
            payload.insert("username".to_string(), Value::String(username));
        }
        let payload = Value::Object(payload);

        let client = http::client_for(ctx, self.timeout)?;
        let response = http::send_with_retry("Webhook", self.policy, || {
            client.post(&url).timeout(self.timeout).json(&payload)
        })
        .await?;

        let status = response.status().as_u16();
        log::debug!("Webhook delivered for node '{}' ({})", node.display_name(), status);

        Ok(json!({
            "delivered": true,
            "status": status,
        }))
    }
}
