use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::handlers::ApiError;
use crate::services::AppState;

/// Blocks session traffic while a write-back flush holds the global lock,
/// answering 503 once the retry budget runs out.
pub async fn request_gate_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state.request_gate.wait_until_open().await?;
    Ok(next.run(request).await)
}
