use crate::handlers::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

/// Health check endpoint
/// Returns 200 OK if the service is running
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "promsage",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Readiness check endpoint
/// Ready only when the metrics backend answers a trivial query.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.backend.test_connection().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "breaker": state.backend.breaker_state().as_str(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "breaker": state.backend.breaker_state().as_str(),
                "error": e.to_string(),
            })),
        ),
    }
}
