//! Knowledge scopes.
//!
//! A scope is the partition key under which triggers are matched. Whether
//! knowledge is kept per conversation or shared by every conversation is a
//! deployment choice expressed by [`SharingMode`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key used for every request when knowledge is shared globally.
pub const GLOBAL_SCOPE: &str = "global";

/// Opaque partition key for knowledge entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Scope for a single conversation.
    pub fn conversation(conversation_id: impl fmt::Display) -> Self {
        Self(format!("conversation:{}", conversation_id))
    }

    /// The fixed scope shared by every conversation.
    pub fn global() -> Self {
        Self(GLOBAL_SCOPE.to_string())
    }

    /// Wrap an already-formed scope key.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_SCOPE
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How knowledge is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SharingMode {
    /// Each conversation learns and answers independently.
    #[default]
    PerConversation,
    /// One knowledge base for every conversation.
    Global,
}

impl SharingMode {
    /// Parse a mode name as used in environment variables.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "per_conversation" | "per-conversation" | "conversation" | "chat" => {
                Some(Self::PerConversation)
            }
            "global" | "shared" => Some(Self::Global),
            _ => None,
        }
    }
}

/// Maps an incoming conversation to the scope its knowledge lives in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeResolver {
    mode: SharingMode,
}

impl ScopeResolver {
    pub fn new(mode: SharingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> SharingMode {
        self.mode
    }

    /// Resolve the scope for a conversation.
    pub fn resolve(&self, conversation_id: impl fmt::Display) -> Scope {
        match self.mode {
            SharingMode::PerConversation => Scope::conversation(conversation_id),
            SharingMode::Global => Scope::global(),
        }
    }
}
