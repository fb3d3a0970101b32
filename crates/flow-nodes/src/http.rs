//! Shared HTTP plumbing for external-action handlers
//!
//! Bounded retry on transient faults, status-class error hints, and access
//! to the host's shared `reqwest::Client`.

use std::time::Duration;

use flow_engine::{extension_keys, EngineConfig, NodeContext, NodeError};
use serde_json::Value;

/// Longest response body carried into an error message
const MAX_ERROR_BODY: usize = 500;

/// Attempt budget and backoff for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Attempt N waits N times this before retrying
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            attempts: config.http_retries.max(1),
            backoff: config.retry_backoff(),
        }
    }

    /// Same backoff with a node-specific attempt count
    ///
    /// A node may lower the configured budget but never raise it.
    pub fn with_attempts(self, attempts: Option<u64>) -> Self {
        match attempts {
            Some(n) => Self {
                attempts: u32::try_from(n)
                    .unwrap_or(u32::MAX)
                    .clamp(1, self.attempts.max(1)),
                ..self
            },
            None => self,
        }
    }
}

/// Guidance shown with a non-success status
pub fn status_hint(status: u16) -> &'static str {
    match status {
        400 => "Bad request, check the request body and parameters",
        401 => "Unauthorized, check the credentials",
        403 => "Forbidden, the credentials lack permission for this resource",
        404 => "Resource not found, check the URL",
        429 => "Rate limited, slow down or retry later",
        500..=599 => "Service unavailable or failing, retry later",
        _ => "Unexpected response status",
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// The host's shared client, or a fresh one with the given timeout
pub fn client_for(ctx: &NodeContext, timeout: Duration) -> Result<reqwest::Client, NodeError> {
    if let Some(client) = ctx.extensions.get::<reqwest::Client>(extension_keys::HTTP_CLIENT) {
        return Ok(client.clone());
    }
    build_client(timeout)
}

/// Build a client with a per-request timeout
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, NodeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NodeError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Send a request, retrying connect/timeout errors and 429/5xx responses
///
/// `build` is called once per attempt. Non-success responses that are not
/// retried (or exhaust the budget) become [`NodeError::ExternalService`].
pub async fn send_with_retry<F>(
    service: &str,
    policy: RetryPolicy,
    build: F,
) -> Result<reqwest::Response, NodeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 1;
    loop {
        let retry_left = attempt < policy.attempts;

        match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                if !(retry_left && is_transient_status(status)) {
                    return Err(external_error(service, response).await);
                }
                log::warn!(
                    "{} returned {} (attempt {}/{}), retrying",
                    service,
                    status,
                    attempt,
                    policy.attempts
                );
            }
            Err(e) if retry_left && (e.is_connect() || e.is_timeout()) => {
                log::warn!(
                    "{} request failed (attempt {}/{}): {}, retrying",
                    service,
                    attempt,
                    policy.attempts,
                    e
                );
            }
            Err(e) if e.is_timeout() => {
                return Err(NodeError::Timeout(format!("{} request timed out: {}", service, e)));
            }
            Err(e) => {
                return Err(NodeError::failed(format!("{} request failed: {}", service, e)));
            }
        }

        tokio::time::sleep(policy.backoff * attempt).await;
        attempt += 1;
    }
}

/// Wrap a non-success response with its status, hint and (truncated) body
pub async fn external_error(service: &str, response: reqwest::Response) -> NodeError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    let body = if body.chars().count() > MAX_ERROR_BODY {
        let cut: String = body.chars().take(MAX_ERROR_BODY).collect();
        Some(format!("{}...", cut))
    } else if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    };

    NodeError::ExternalService {
        service: service.to_string(),
        status,
        hint: status_hint(status).to_string(),
        body,
    }
}

/// Response body as JSON when it parses, otherwise as text
pub async fn read_body(service: &str, response: reqwest::Response) -> Result<Value, NodeError> {
    let text = response
        .text()
        .await
        .map_err(|e| NodeError::failed(format!("Failed to read {} response: {}", service, e)))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_status_hints_by_class() {
        assert!(status_hint(401).contains("credentials"));
        assert!(status_hint(404).contains("URL"));
        assert!(status_hint(503).contains("unavailable"));
        assert_eq!(status_hint(418), "Unexpected response status");
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = EngineConfig::default();
        config.http_retries = 0;
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.attempts, 1);
        assert_eq!(policy.with_attempts(Some(5)).attempts, 1);
    }

    #[test]
    fn test_node_attempts_stay_within_configured_budget() {
        let mut config = EngineConfig::default();
        config.http_retries = 4;
        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy.with_attempts(None).attempts, 4);
        assert_eq!(policy.with_attempts(Some(2)).attempts, 2);
        assert_eq!(policy.with_attempts(Some(0)).attempts, 1);
        assert_eq!(policy.with_attempts(Some(100_000)).attempts, 4);
        // would truncate to 1 if cast
        assert_eq!(policy.with_attempts(Some((1 << 32) + 1)).attempts, 4);
        assert_eq!(policy.with_attempts(Some(u64::MAX)).attempts, 4);
    }

    #[tokio::test]
    async fn test_retries_transient_status_until_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/flaky",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy")
                    } else {
                        (StatusCode::OK, "ok")
                    }
                }
            }),
        );
        let base = test_server::spawn(router).await;
        let client = reqwest::Client::new();

        let response = send_with_retry("HTTP", fast_policy(3), || {
            client.get(format!("{}/flaky", base))
        })
        .await
        .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_last_status() {
        let router = Router::new().route(
            "/down",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream gone") }),
        );
        let base = test_server::spawn(router).await;
        let client = reqwest::Client::new();

        let err = send_with_retry("HTTP", fast_policy(2), || client.get(format!("{}/down", base)))
            .await
            .unwrap_err();

        match err {
            NodeError::ExternalService { status, body, .. } => {
                assert_eq!(status, 502);
                assert_eq!(body.as_deref(), Some("upstream gone"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/missing",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::NOT_FOUND }
            }),
        );
        let base = test_server::spawn(router).await;
        let client = reqwest::Client::new();

        let err = send_with_retry("HTTP", fast_policy(3), || {
            client.get(format!("{}/missing", base))
        })
        .await
        .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            err.to_string(),
            "HTTP returned 404: Resource not found, check the URL"
        );
    }
}
