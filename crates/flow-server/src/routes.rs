use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flow_engine::{
    validate_workflow, EngineError, Execution, NodeDescriptor, RunRequest, RunResponse, Workflow,
    WorkflowSummary,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::AppState;

/// An engine error rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EngineError::InvalidRequest(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::WorkflowNotFound(_) | EngineError::ExecutionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::GraphCycle { .. } | EngineError::InvalidGraph(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::Storage(_) | EngineError::Serialization(_) | EngineError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        } else {
            log::debug!("Request rejected ({}): {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// POST /api/executions
pub async fn run_workflow(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> ApiResult<RunResponse> {
    let Json(request) = payload?;
    let response = state.controller.run(request).await?;
    Ok(Json(response))
}

// GET /api/executions/:id
pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Execution> {
    let execution = state.controller.execution(&id).await?;
    Ok(Json(execution))
}

// GET /api/workflows
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> Json<Vec<WorkflowSummary>> {
    Json(state.controller.catalog().list())
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

// POST /api/workflows/validate
pub async fn validate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Workflow>, JsonRejection>,
) -> ApiResult<ValidationReport> {
    let Json(workflow) = payload?;
    let errors: Vec<String> = validate_workflow(&workflow, Some(state.controller.registry()))
        .iter()
        .map(|e| e.to_string())
        .collect();
    Ok(Json(ValidationReport {
        valid: errors.is_empty(),
        errors,
    }))
}

// GET /api/node-types
pub async fn node_types(State(state): State<Arc<AppState>>) -> Json<Vec<NodeDescriptor>> {
    Json(
        state
            .controller
            .registry()
            .descriptors()
            .into_iter()
            .cloned()
            .collect(),
    )
}
