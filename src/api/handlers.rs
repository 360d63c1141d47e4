//! HTTP request handlers

use super::types::{AssistantRequest, AssistantResponse, ErrorResponse, ResetResponse};
use super::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/assistant", post(assistant))
        .route("/api/reset_threads", post(reset_threads))
        .with_state(state)
}

// ============================================================
// Assistant Turn
// ============================================================

async fn assistant(
    State(state): State<AppState>,
    Json(req): Json<AssistantRequest>,
) -> Result<Json<AssistantResponse>, AppError> {
    // Entry contract: both fields present and non-empty, checked before
    // any orchestration side effects.
    if req.message.trim().is_empty() || req.id.trim().is_empty() {
        return Err(AppError::BadRequest("Invalid input".to_string()));
    }

    let response = state
        .orchestrator
        .handle_turn(&req.id, &req.message)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(AssistantResponse { response }))
}

// ============================================================
// Session Reset
// ============================================================

async fn reset_threads(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    state
        .orchestrator
        .reset_sessions()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(ResetResponse {
        message: "Threads database reset successfully.".to_string(),
    }))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
