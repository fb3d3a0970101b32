//! HTTP surface for the flow engine
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/api/executions` | run a stored workflow |
//! | GET | `/api/executions/:id` | fetch an execution record |
//! | GET | `/api/workflows` | list stored workflows |
//! | POST | `/api/workflows/validate` | validate a workflow body |
//! | GET | `/api/node-types` | registered node types |
//! | GET | `/health` | liveness |

pub mod config;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use flow_engine::{
    ExecutionController, ExecutionStore, ExecutorExtensions, InMemoryConversationMemory,
    InMemoryExecutionStore, JsonFileExecutionStore, LogEventSink, Result, WorkflowCatalog,
};
use tower_http::cors::CorsLayer;

pub use config::ServerConfig;

/// Shared handler state
pub struct AppState {
    pub controller: ExecutionController,
}

impl AppState {
    pub fn new(controller: ExecutionController) -> Self {
        Self { controller }
    }

    /// Wire a controller from configuration
    ///
    /// With a data dir, workflows load from `<data>/workflows` and executions
    /// are written to `<data>/executions`.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let catalog = match config.workflows_dir() {
            Some(dir) => {
                let catalog = WorkflowCatalog::with_persistence(&dir);
                let loaded = catalog.load_from_disk()?;
                log::info!("Loaded {} workflows from {}", loaded, dir.display());
                catalog
            }
            None => WorkflowCatalog::new(),
        };

        let store: Arc<dyn ExecutionStore> = match config.executions_dir() {
            Some(dir) => {
                log::info!("Persisting executions to {}", dir.display());
                Arc::new(JsonFileExecutionStore::new(dir))
            }
            None => Arc::new(InMemoryExecutionStore::new()),
        };

        let engine = config.engine.clone();
        let mut extensions = ExecutorExtensions::new();
        flow_nodes::setup_extensions(&mut extensions, &engine)
            .map_err(|e| flow_engine::EngineError::InvalidRequest(e.to_string()))?;

        let controller = ExecutionController::new(
            Arc::new(catalog),
            Arc::new(flow_nodes::builtin_registry(&engine)),
            store,
        )
        .with_memory(Arc::new(InMemoryConversationMemory::new(engine.max_memory_turns)))
        .with_extensions(extensions)
        .with_event_sink(Arc::new(LogEventSink))
        .with_config(engine);

        Ok(Self::new(controller))
    }
}

/// Build the router over shared state
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/executions", post(routes::run_workflow))
        .route("/api/executions/:id", get(routes::get_execution))
        .route("/api/workflows", get(routes::list_workflows))
        .route("/api/workflows/validate", post(routes::validate))
        .route("/api/node-types", get(routes::node_types))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use flow_engine::WorkflowBuilder;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn branching_workflow() -> flow_engine::Workflow {
        WorkflowBuilder::new("wf-orders", "Orders")
            .add_node("start", "manual-trigger")
            .add_node("check", "if-else")
            .with_config(json!({"condition": "{{input.total}} > 100"}))
            .add_node("big", "set")
            .with_config(json!({"fields": {"tier": "gold"}}))
            .add_node("small", "set")
            .with_config(json!({"fields": {"tier": "standard"}}))
            .connect("start", "check")
            .connect_branch("check", "true", "big")
            .connect_branch("check", "false", "small")
            .build()
    }

    fn app_with(dir: &TempDir) -> Router {
        let mut config = ServerConfig::default();
        config.data_dir = Some(dir.path().to_path_buf());
        let state = AppState::from_config(&config).unwrap();
        state.controller.catalog().insert(branching_workflow()).unwrap();
        build_app(Arc::new(state))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app_with(&dir), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_run_then_fetch_execution() {
        let dir = TempDir::new().unwrap();
        let app = app_with(&dir);

        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/executions",
                json!({"workflowId": "wf-orders", "input": {"total": 120}}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["output"]["tier"], "gold");

        let id = body["executionId"].as_str().unwrap().to_string();
        assert!(dir.path().join("executions").join(format!("{}.json", id)).exists());

        let (status, record) = send(app, get(&format!("/api/executions/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["workflowId"], "wf-orders");
        let skipped: Vec<&str> = record["logs"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|l| l["status"] == "skipped")
            .map(|l| l["nodeId"].as_str().unwrap())
            .collect();
        assert_eq!(skipped, vec!["small"]);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(
            app_with(&dir),
            post_json("/api/executions", json!({"workflowId": "nope", "input": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Workflow not found: nope");
    }

    fn post_raw(uri: &str, content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_400() {
        let dir = TempDir::new().unwrap();
        let app = app_with(&dir);

        for (uri, content_type, body) in [
            ("/api/executions", "application/json", "{not json"),
            ("/api/executions", "application/json", r#"{"input": {}}"#),
            ("/api/executions", "text/plain", r#"{"workflowId": "wf-orders"}"#),
            ("/api/workflows/validate", "application/json", "[1, 2"),
        ] {
            let (status, body) = send(app.clone(), post_raw(uri, content_type, body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", uri, body);
            assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
        }
    }

    #[tokio::test]
    async fn test_unknown_execution_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app_with(&dir), get("/api/executions/missing-id")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing-id"));
    }

    #[tokio::test]
    async fn test_cyclic_workflow_is_422() {
        let dir = TempDir::new().unwrap();
        let mut config = ServerConfig::default();
        config.data_dir = Some(dir.path().to_path_buf());
        let state = AppState::from_config(&config).unwrap();
        let cyclic = WorkflowBuilder::new("wf-loop", "Loop")
            .add_node("a", "noop")
            .add_node("b", "noop")
            .connect("a", "b")
            .connect("b", "a")
            .build();
        state.controller.catalog().insert(cyclic).unwrap();

        let (status, body) = send(
            build_app(Arc::new(state)),
            post_json("/api/executions", json!({"workflowId": "wf-loop"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("cycle"));
    }

    #[tokio::test]
    async fn test_validate_reports_problems() {
        let dir = TempDir::new().unwrap();
        let workflow = json!({
            "id": "draft",
            "name": "Draft",
            "nodes": [
                {"id": "a", "type": "manual-trigger"},
                {"id": "b", "type": "teleport"}
            ],
            "edges": [{"id": "e1", "source": "a", "target": "b"}]
        });
        let (status, body) = send(app_with(&dir), post_json("/api/workflows/validate", workflow)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
        assert_eq!(body["errors"][0], "Unknown node type 'teleport' for node 'b'");
    }

    #[tokio::test]
    async fn test_lists_workflows_and_node_types() {
        let dir = TempDir::new().unwrap();
        let app = app_with(&dir);

        let (_, workflows) = send(app.clone(), get("/api/workflows")).await;
        assert_eq!(workflows[0]["id"], "wf-orders");
        assert_eq!(workflows[0]["nodeCount"], 4);

        let (_, types) = send(app, get("/api/node-types")).await;
        let names: Vec<&str> = types
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["nodeType"].as_str())
            .collect();
        assert!(names.contains(&"llm-chat"));
        assert!(names.contains(&"switch"));
    }
}
