//! Outgoing message tracking.

use axum::{extract::State, http::StatusCode, Json};
use nemu_core::MessageId;
use serde::Deserialize;

use super::ScopeTarget;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PromptSentRequest {
    pub message_id: MessageId,
    #[serde(flatten)]
    pub target: ScopeTarget,
    /// The query the prompt asks to be taught.
    pub query: String,
}

/// A teaching prompt was sent.
/// POST /v1/sent/prompt
pub async fn prompt_sent(
    State(state): State<AppState>,
    Json(request): Json<PromptSentRequest>,
) -> ApiResult<StatusCode> {
    if request.query.trim().is_empty() {
        return Err(ApiError::validation("query must not be blank"));
    }

    let scope = request.target.resolve(&state)?;
    state
        .engine
        .on_prompt_sent(request.message_id, scope, &request.query);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MessageSentRequest {
    pub message_id: MessageId,
}

/// Any other message was sent.
/// POST /v1/sent/message
pub async fn message_sent(
    State(state): State<AppState>,
    Json(request): Json<MessageSentRequest>,
) -> ApiResult<StatusCode> {
    state.engine.on_message_sent(request.message_id);
    Ok(StatusCode::NO_CONTENT)
}
