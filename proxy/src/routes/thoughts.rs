use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// GET /api/thoughts
///
/// Latest non-empty thoughts list from the agent's memory table.
pub async fn get_thoughts(State(state): State<AppState>) -> impl IntoResponse {
    match state.thoughts.latest_thoughts().await {
        Ok(Some(doc)) => (StatusCode::OK, Json(doc)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No thoughts found" })),
        ),
        Err(e) => {
            warn!("Failed to fetch thoughts: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch thoughts",
                    "message": e.to_string(),
                })),
            )
        }
    }
}
