//! Incoming message endpoints.

use axum::{extract::State, Json};
use nemu_core::{Classification, IncomingMessage, Reaction, Scope};
use serde::{Deserialize, Serialize};

use super::ScopeTarget;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Decide how to react to a message.
/// POST /v1/messages
pub async fn dispatch_message(
    State(state): State<AppState>,
    Json(message): Json<IncomingMessage>,
) -> ApiResult<Json<Reaction>> {
    Ok(Json(state.engine.dispatch(&message).await))
}

/// Request body for classifying raw text.
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
    #[serde(default)]
    pub is_reply_to_known_message: bool,
    #[serde(default)]
    pub requires_trigger: bool,
}

/// Classify raw text.
/// POST /v1/classify
pub async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> ApiResult<Json<Classification>> {
    Ok(Json(state.engine.classify(
        &request.text,
        request.is_reply_to_known_message,
        request.requires_trigger,
    )))
}

/// Request body for looking up an answer.
#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    #[serde(flatten)]
    pub target: ScopeTarget,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub scope: Scope,
    /// `None` means the caller should send a teaching prompt.
    pub answer: Option<String>,
}

/// Look up an answer.
/// POST /v1/answer
pub async fn answer(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<Json<AnswerResponse>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::validation("query must not be blank"));
    }

    let scope = request.target.resolve(&state)?;
    let answer = state.engine.answer(&scope, &request.query).await;

    Ok(Json(AnswerResponse { scope, answer }))
}
