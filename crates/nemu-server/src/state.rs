//! Server state management.

use std::sync::Arc;

use nemu_core::{KnowledgeEngine, SqliteInteractionStats};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<KnowledgeEngine>,
    /// Interaction counters, when the statistics database could be opened.
    pub stats: Option<Arc<SqliteInteractionStats>>,
}

impl AppState {
    pub fn new(engine: Arc<KnowledgeEngine>) -> Self {
        Self {
            engine,
            stats: None,
        }
    }

    /// Expose interaction counters through the API.
    pub fn with_stats(mut self, stats: Arc<SqliteInteractionStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Whether the knowledge storage is attached yet.
    pub async fn is_ready(&self) -> bool {
        self.engine.is_storage_attached().await
    }
}
