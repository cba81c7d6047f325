//! Storage collaborator for the knowledge store.
//!
//! The knowledge store runs its tiered lookup against this trait. Every
//! operation is already partitioned by [`Scope`]; in global sharing mode the
//! scope is a constant.

mod sqlite;
mod trigger_index;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NemuResult;
use crate::types::{Author, KnowledgeEntry, Scope, TeachResult};

pub use sqlite::SqliteKnowledgeStorage;
pub use trigger_index::TriggerIndex;

/// An entry found by the relevance tier, with its lexical score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    /// BM25 score (unbounded, higher = more relevant).
    pub score: f32,
}

/// Persistent backing store for knowledge entries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeStorage: Send + Sync {
    /// Entry whose normalized trigger equals `trigger`.
    ///
    /// Ties go to the highest usage count, then the most recent update.
    async fn find_exact(&self, scope: &Scope, trigger: &str) -> NemuResult<Option<KnowledgeEntry>>;

    /// Best entry whose trigger scores above `min_score` against `query`.
    ///
    /// Ranked by score, then usage count.
    async fn find_by_relevance(
        &self,
        scope: &Scope,
        query: &str,
        min_score: f32,
    ) -> NemuResult<Option<ScoredEntry>>;

    /// Entry whose trigger contains `query` or is contained in it.
    ///
    /// Ties go to the highest usage count, then the most recent update.
    async fn find_by_substring(&self, scope: &Scope, query: &str) -> NemuResult<Option<KnowledgeEntry>>;

    /// Credit one use to an entry.
    async fn increment_usage(&self, entry_id: i64) -> NemuResult<()>;

    /// Insert or replace the response for `(scope, trigger)`.
    ///
    /// Must be atomic per `(scope, trigger)`: concurrent upserts of the same
    /// trigger never both insert.
    async fn upsert(
        &self,
        scope: &Scope,
        trigger: &str,
        response: &str,
        author: &Author,
    ) -> NemuResult<TeachResult>;
}
