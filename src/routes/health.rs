use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness only; does not touch the store.
#[axum::debug_handler]
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
