//! Generic HTTP call node

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use flow_engine::{template, EngineConfig, NodeContext, NodeError, NodeHandler, WorkflowNode};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::http::{self, RetryPolicy};
use crate::resolved_config;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HttpRequestConfig {
    url: Option<String>,
    method: Option<String>,
    headers: BTreeMap<String, Value>,
    query: BTreeMap<String, Value>,
    body: Option<Value>,
    timeout_ms: Option<u64>,
    retries: Option<u64>,
}

/// Calls an arbitrary URL with retry and status hints
///
/// Every string in the config is resolved against the node input first,
/// so `{{input.id}}` works in the URL, headers, query and body.
pub struct HttpRequestHandler {
    policy: RetryPolicy,
    timeout: Duration,
}

impl HttpRequestHandler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(config),
            timeout: config.http_timeout(),
        }
    }

    /// Per-node timeout, capped at the configured one
    fn request_timeout(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .map(|ms| Duration::from_millis(ms).min(self.timeout))
            .unwrap_or(self.timeout)
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn execute(
        &self,
        node: &WorkflowNode,
        input: Value,
        ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let config: HttpRequestConfig = resolved_config(node, &input)?;

        let url = config
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| NodeError::missing("url"))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NodeError::validation("url", "must start with http:// or https://"));
        }

        let method_name = config.method.unwrap_or_else(|| "GET".to_string());
        let method = Method::from_bytes(method_name.trim().to_uppercase().as_bytes())
            .map_err(|_| NodeError::validation("method", format!("unknown method '{}'", method_name)))?;

        let timeout = self.request_timeout(config.timeout_ms);
        let client = http::client_for(ctx, timeout)?;
        let policy = self.policy.with_attempts(config.retries);

        let mut headers = text_map(config.headers);
        let query: Vec<(String, String)> = text_map(config.query).into_iter().collect();
        if let Some(auth) = ctx.credential("authorization") {
            headers.insert("Authorization".to_string(), auth.to_string());
        } else if let Some(token) = ctx.credential("token") {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }

        let body = config.body.filter(|b| !b.is_null());

        log::debug!("HTTP {} {} (node '{}')", method, url, node.display_name());

        let response = http::send_with_retry("HTTP", policy, || {
            let mut request = client.request(method.clone(), &url).timeout(timeout);
            for (name, value) in &headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if !query.is_empty() {
                request = request.query(&query);
            }
            match &body {
                Some(Value::String(text)) => request.body(text.clone()),
                Some(value) => request.json(value),
                None => request,
            }
        })
        .await?;

        let status = response.status().as_u16();
        let response_headers: Map<String, Value> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
            })
            .collect();
        let body = http::read_body("HTTP", response).await?;

        Ok(json!({
            "status": status,
            "headers": response_headers,
            "body": body,
        }))
    }
}


/// Header and query values may resolve to numbers or booleans
fn text_map(values: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    values
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k, template::stringify(&v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn node(config: Value) -> WorkflowNode {
        let mut node = WorkflowNode::new("call", "http-request");
        node.config = config;
        node
    }

    fn handler() -> HttpRequestHandler {
        let mut config = EngineConfig::default();
        config.retry_backoff_ms = 1;
        HttpRequestHandler::new(&config)
    }

    #[test]
    fn test_node_timeout_is_capped() {
        let mut config = EngineConfig::default();
        config.http_timeout_ms = 1_000;
        let handler = HttpRequestHandler::new(&config);

        assert_eq!(handler.request_timeout(None), Duration::from_secs(1));
        assert_eq!(handler.request_timeout(Some(250)), Duration::from_millis(250));
        assert_eq!(handler.request_timeout(Some(86_400_000)), Duration::from_secs(1));
        assert_eq!(handler.request_timeout(Some(u64::MAX)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_missing_url_is_validation_error() {
        let err = handler()
            .execute(&node(json!({})), json!({}), &NodeContext::new("wf", "ex"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for 'url': required field is missing"
        );
    }

    #[tokio::test]
    async fn test_post_resolves_templates_and_sends_bearer_token() {
        let router = Router::new().route(
            "/orders/:id",
            post(
                |headers: HeaderMap,
                 Query(query): Query<HashMap<String, String>>,
                 Json(body): Json<Value>| async move {
                    Json(json!({
                        "auth": headers.get("authorization").and_then(|v| v.to_str().ok()),
                        "source": query.get("source"),
                        "body": body,
                    }))
                },
            ),
        );
        let base = test_server::spawn(router).await;

        let config = json!({
            "url": format!("{}/orders/{{{{input.id}}}}", base),
            "method": "post",
            "query": {"source": "{{input.channel}}"},
            "body": {"total": "{{input.total}}"},
            "token": "secret",
        });
        let node = node(config);
        let ctx = NodeContext::new("wf", "ex").for_node(&node);

        let output = handler()
            .execute(&node, json!({"id": 7, "channel": "web", "total": 120}), &ctx)
            .await
            .unwrap();

        assert_eq!(output["status"], 200);
        assert_eq!(output["body"]["auth"], "Bearer secret");
        assert_eq!(output["body"]["source"], "web");
        assert_eq!(output["body"]["body"]["total"], 120);
    }

    #[tokio::test]
    async fn test_not_found_carries_hint() {
        let router = Router::new().route("/present", get(|| async { "here" }));
        let base = test_server::spawn(router).await;

        let err = handler()
            .execute(
                &node(json!({"url": format!("{}/absent", base)})),
                Value::Null,
                &NodeContext::new("wf", "ex"),
            )
            .await
            .unwrap_err();

        match err {
            NodeError::ExternalService { status, hint, .. } => {
                assert_eq!(status, 404);
                assert!(hint.contains("check the URL"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_text_body_passes_through() {
        let router = Router::new().route("/plain", get(|| async { "just text" }));
        let base = test_server::spawn(router).await;

        let output = handler()
            .execute(
                &node(json!({"url": format!("{}/plain", base)})),
                Value::Null,
                &NodeContext::new("wf", "ex"),
            )
            .await
            .unwrap();
        assert_eq!(output["body"], "just text");
    }
}
