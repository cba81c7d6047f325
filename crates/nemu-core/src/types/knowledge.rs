//! Knowledge entry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::Scope;

/// Normalize query text into trigger form: trimmed and case-folded.
pub fn normalize_trigger(text: &str) -> String {
    text.trim().to_lowercase()
}

/// The person who taught (or asked) something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Transport-level user identifier.
    pub id: i64,
    /// Display name; may be a username or a first name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Author {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    pub fn anonymous(id: i64) -> Self {
        Self { id, name: None }
    }

    /// Name to address the author by.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("friend")
    }
}

/// A stored trigger → response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Storage identifier, stable across updates.
    pub id: i64,
    pub scope: Scope,
    /// Normalized trigger text.
    pub trigger: String,
    /// Response returned verbatim (before decoration).
    pub response: String,
    /// Last author of the response.
    pub taught_by: Author,
    /// Number of times this entry answered a query.
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
    /// Changes on every teach, never on a read.
    pub updated_at: DateTime<Utc>,
}

/// Result of an upsert against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachResult {
    Created,
    Updated,
}

/// Outcome of processing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachOutcome {
    /// A new entry was created.
    Learned,
    /// An existing entry got a new response.
    Updated,
    /// The reply does not correlate to any pending prompt.
    NotATeachingReply,
    /// The reply was a lesson but the store did not keep it.
    StorageFailed,
}

impl TeachOutcome {
    /// Past-tense verb describing what happened to the lesson.
    pub fn verb(&self) -> Option<&'static str> {
        match self {
            Self::Learned => Some("learned"),
            Self::Updated => Some("updated"),
            Self::NotATeachingReply | Self::StorageFailed => None,
        }
    }
}

impl From<TeachResult> for TeachOutcome {
    fn from(result: TeachResult) -> Self {
        match result {
            TeachResult::Created => Self::Learned,
            TeachResult::Updated => Self::Updated,
        }
    }
}
