use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use super::ApiError;
use crate::{
    extractors::AppJson,
    models::{CreateSessionRequest, UpdateSessionRequest, UpdateSessionResponse},
    services::AppState,
};

/// POST /sessions/
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?;

    tracing::info!(
        "Creating session for user_id={}, quiz_id={}",
        req.user_id,
        req.quiz_id
    );

    let session = state
        .sessions
        .create_session(&req.user_id, &req.quiz_id, req.omr_mode)
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_session(&session_id).await?;
    Ok(Json(session))
}

/// PATCH /sessions/{id}
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(
        "Applying {} to session {}",
        req.event.as_str(),
        session_id
    );

    let time_remaining = state
        .sessions
        .apply_event(&session_id, req.event, req.metrics)
        .await?;

    Ok(Json(UpdateSessionResponse { time_remaining }))
}
