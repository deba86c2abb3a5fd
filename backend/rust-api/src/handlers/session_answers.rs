use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::{extractors::AppJson, models::UpdateSessionAnswer, services::AppState};

/// GET /session_answers/{session_id}/{position}
pub async fn get_session_answer(
    State(state): State<Arc<AppState>>,
    Path((session_id, position)): Path<(String, usize)>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state
        .sessions
        .get_session_answer(&session_id, position)
        .await?;
    Ok(Json(answer))
}

/// PATCH /session_answers/{session_id}/{position}
pub async fn update_session_answer(
    State(state): State<Arc<AppState>>,
    Path((session_id, position)): Path<(String, usize)>,
    AppJson(patch): AppJson<UpdateSessionAnswer>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state
        .sessions
        .update_session_answer(&session_id, position, patch)
        .await?;
    Ok(Json(answer))
}

/// PATCH /session_answers/{session_id}/update-multiple-answers
///
/// Body: `[[position, patch], ...]`.
pub async fn update_session_answers(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(patches): AppJson<Vec<(usize, UpdateSessionAnswer)>>,
) -> Result<impl IntoResponse, ApiError> {
    let answers = state
        .sessions
        .update_session_answers(&session_id, patches)
        .await?;
    Ok(Json(answers))
}
