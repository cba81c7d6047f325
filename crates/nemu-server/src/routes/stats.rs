//! Interaction statistics endpoint.

use axum::{
    extract::{Path, State},
    Json,
};
use nemu_core::UserStats;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Counters for one user.
/// GET /v1/users/:user_id/stats
pub async fn user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserStats>> {
    let stats = state
        .stats
        .as_ref()
        .ok_or_else(|| ApiError::unavailable("Interaction statistics are disabled"))?;

    stats
        .stats(user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No interactions recorded for user {}", user_id)))
}
