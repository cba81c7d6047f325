//! Message-level types exchanged with the transport layer.

use serde::{Deserialize, Serialize};

use super::knowledge::{Author, TeachOutcome};
use super::scope::Scope;

/// Transport-assigned message identifier.
pub type MessageId = i64;

/// Result of deciding whether a message is addressed to nemu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "query", rename_all = "snake_case")]
pub enum Classification {
    Ignore,
    Respond(String),
}

impl Classification {
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Respond(query) => Some(query),
            Self::Ignore => None,
        }
    }
}

/// An inbound text message as seen by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Conversation the message was posted in.
    pub conversation_id: i64,
    pub text: String,
    pub author: Author,
    /// The message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Group-like conversations require the trigger token.
    #[serde(default)]
    pub requires_trigger: bool,
}

/// What the transport should do with an incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reaction {
    /// Stay silent.
    Ignore,
    /// Reply with a known answer.
    Answer { text: String },
    /// Reply with a teaching prompt, then report its id via `on_prompt_sent`.
    AskToBeTaught {
        scope: Scope,
        query: String,
        prompt: String,
    },
    /// Reply acknowledging a lesson.
    Acknowledge { outcome: TeachOutcome, text: String },
}
