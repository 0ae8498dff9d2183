use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use riddler_core::error::RiddleError;
use riddler_core::types::SessionId;
use riddler_pipeline::SessionProgress;

use crate::error::ApiError;
use crate::state::AppState;

const BANNER: &str = "Riddler API. POST /riddle with {\"question\": \"...\"}, or drive it step by step under /riddle/sessions.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiddleRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub search_requested: bool,
    /// Client-chosen id for session starts; generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

impl RiddleRequest {
    fn workflow_input(&self) -> Result<Value, ApiError> {
        let question = self
            .question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or(ApiError::BadRequest("Question is required"))?;
        Ok(json!({
            "question": question,
            "searchRequested": self.search_requested,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    #[serde(default)]
    pub expected_step: Option<String>,
}

// GET /
pub async fn index() -> &'static str {
    BANNER
}

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "buildTime": state.build_time(),
        "environment": state.config.environment,
    }))
}

// POST /riddle
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RiddleRequest>,
) -> Result<Json<Value>, ApiError> {
    let input = body.workflow_input()?;
    let output = state.workflow.run(input).await?;
    info!(elapsed_ms = output.elapsed_ms, steps = output.results.len(), "Riddle answered");
    Ok(Json(output.value))
}

// POST /riddle/sessions
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RiddleRequest>,
) -> Result<(StatusCode, Json<SessionProgress>), ApiError> {
    let input = body.workflow_input()?;
    let id = body
        .session_id
        .as_deref()
        .map(SessionId::from_string)
        .unwrap_or_else(SessionId::new);
    let progress = state.sessions.start(input, &id).await?;
    Ok((StatusCode::CREATED, Json(progress)))
}

// POST /riddle/sessions/{id}/continue
pub async fn continue_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ContinueRequest>>,
) -> Result<Json<SessionProgress>, ApiError> {
    let expected = body.and_then(|Json(b)| b.expected_step);
    let progress = state
        .sessions
        .continue_session(&id, expected.as_deref())
        .await?;
    Ok(Json(progress))
}

// GET /riddle/sessions/{id}
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionProgress>, ApiError> {
    state
        .sessions
        .get_status(&id)
        .await?
        .map(Json)
        .ok_or(ApiError::Riddle(RiddleError::SessionNotFound(id)))
}

// DELETE /riddle/sessions/{id}
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sessions.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
