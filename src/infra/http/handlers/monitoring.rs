use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::infra::http::error::ApiError;
use crate::infra::http::response::ApiSuccess;
use crate::infra::http::state::HttpState;

/// Liveness probe; answers without touching the database or the cache.
pub async fn health(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.monitoring.health())
}

pub async fn metrics(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.monitoring.metrics().await?;
    Ok(ApiSuccess::ok("Metrics retrieved successfully", report))
}

pub async fn logs(State(state): State<HttpState>) -> Result<impl IntoResponse, ApiError> {
    let tail = state.monitoring.log_tail().await?;
    Ok(ApiSuccess::ok("Logs retrieved successfully", tail))
}
