//! Route definitions for the REST API.

mod health;
mod messages;
mod replies;
mod sent;
mod stats;

use axum::{
    routing::{get, post},
    Router,
};
use nemu_core::Scope;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Incoming messages
        .route("/v1/messages", post(messages::dispatch_message))
        .route("/v1/classify", post(messages::classify))
        .route("/v1/answer", post(messages::answer))
        // Teaching
        .route("/v1/replies", post(replies::handle_reply))
        // Outgoing message tracking
        .route("/v1/sent/prompt", post(sent::prompt_sent))
        .route("/v1/sent/message", post(sent::message_sent))
        // Statistics
        .route("/v1/users/:user_id/stats", get(stats::user_stats))
        // Attach state
        .with_state(state)
}

/// Where a request's knowledge lives: an explicit scope, or the scope of a conversation.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeTarget {
    pub scope: Option<Scope>,
    pub conversation_id: Option<i64>,
}

impl ScopeTarget {
    fn resolve(&self, state: &AppState) -> ApiResult<Scope> {
        match (&self.scope, self.conversation_id) {
            (Some(scope), _) => Ok(scope.clone()),
            (None, Some(conversation_id)) => Ok(state.engine.scope_for(conversation_id)),
            (None, None) => Err(ApiError::bad_request(
                "Either scope or conversation_id is required",
            )),
        }
    }
}

pub use health::*;
pub use messages::*;
pub use replies::*;
pub use sent::*;
pub use stats::*;
