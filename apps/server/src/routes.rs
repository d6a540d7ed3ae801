//! HTTP surface mirroring the orchestrator's tool surface 1:1.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use stagehand_core::PipelineOrchestrator;
use stagehand_shared::{PipelineInput, StagehandError};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PipelineOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/pipeline/generate", post(generate))
        .route("/pipeline/update", post(update))
        .route("/pipeline/{id}/status", get(status))
        .route("/pipeline/{id}", delete(remove))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    pipeline: String,
    session_id: Option<String>,
    subject: String,
    context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    session_id: String,
    extra_context: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
}

type ErrorResponse = (StatusCode, Json<ErrorBody>);

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn generate(
    State(state): State<AppState>,
    Json(payload): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let mut input = PipelineInput::new(payload.subject);
    input.context = payload.context;

    let run = state
        .engine
        .generate(&payload.pipeline, payload.session_id, input)
        .await
        .map_err(map_error)?;
    Ok(Json(run))
}

async fn update(
    State(state): State<AppState>,
    Json(payload): Json<UpdateRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let run = state
        .engine
        .update(&payload.session_id, payload.extra_context)
        .await
        .map_err(map_error)?;
    Ok(Json(run))
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ErrorResponse> {
    let report = state.engine.status(&id).await.map_err(map_error)?;
    Ok(Json(report))
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ErrorResponse> {
    state.engine.delete(&id).await.map_err(map_error)?;
    info!(session_id = %id, "session deleted");
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(err: StagehandError) -> ErrorResponse {
    let stage = err.stage().map(|s| s.as_str().to_string());
    let (status, code) = match &err {
        StagehandError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StagehandError::SessionNotReady(_) => (StatusCode::CONFLICT, "not_ready"),
        StagehandError::Config { .. } => (StatusCode::BAD_REQUEST, "invalid_argument"),
        StagehandError::Collection { .. } => (StatusCode::BAD_GATEWAY, "collection_failed"),
        StagehandError::Synthesis { .. } => (StatusCode::BAD_GATEWAY, "synthesis_failed"),
        StagehandError::Analysis { .. } => (StatusCode::BAD_GATEWAY, "analysis_failed"),
        StagehandError::Generation { .. } => (StatusCode::BAD_GATEWAY, "generation_failed"),
    };
    (
        status,
        Json(ErrorBody {
            code,
            message: err.to_string(),
            stage,
        }),
    )
}
