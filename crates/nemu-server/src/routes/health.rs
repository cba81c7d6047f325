//! Health check endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// False while the knowledge storage is still connecting.
    pub storage_attached: bool,
    pub version: String,
}

/// Health check endpoint.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let storage_attached = state.is_ready().await;

    Ok(Json(HealthResponse {
        status: if storage_attached { "healthy" } else { "degraded" }.to_string(),
        storage_attached,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
