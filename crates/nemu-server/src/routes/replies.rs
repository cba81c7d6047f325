//! Teaching reply endpoint.

use axum::{extract::State, Json};
use nemu_core::{phrases, Author, MessageId, TeachOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

/// Request body for a reply to one of nemu's messages.
#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub replied_to: MessageId,
    pub text: String,
    pub author: Author,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub outcome: TeachOutcome,
    /// Text to send back, absent when the reply taught nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledgement: Option<String>,
}

/// Handle a reply, learning from it if it answers a teaching prompt.
/// POST /v1/replies
pub async fn handle_reply(
    State(state): State<AppState>,
    Json(request): Json<ReplyRequest>,
) -> ApiResult<Json<ReplyResponse>> {
    let outcome = state
        .engine
        .on_reply(request.replied_to, &request.text, &request.author)
        .await;
    let acknowledgement = phrases::acknowledgement(
        outcome,
        request.author.display_name(),
        &mut rand::thread_rng(),
    );

    Ok(Json(ReplyResponse {
        outcome,
        acknowledgement,
    }))
}
