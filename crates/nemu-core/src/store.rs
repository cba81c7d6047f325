//! Knowledge store: tiered lookup and upsert-on-teach over a storage collaborator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::KnowledgeConfig;
use crate::error::{NemuError, NemuResult};
use crate::storage::KnowledgeStorage;
use crate::types::{normalize_trigger, Author, KnowledgeEntry, Scope, TeachResult};

/// Which lookup tier produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Relevance,
    Substring,
}

/// A successful lookup. `entry.usage_count` already includes this hit.
#[derive(Debug, Clone)]
pub struct LookupHit {
    pub entry: KnowledgeEntry,
    pub tier: MatchTier,
}

/// Tiered knowledge lookup and teaching.
///
/// The storage may be attached after construction; until then every
/// operation fails with [`NemuError::StorageUnavailable`].
pub struct KnowledgeStore {
    storage: RwLock<Option<Arc<dyn KnowledgeStorage>>>,
    relevance_threshold: f32,
}

impl KnowledgeStore {
    /// Create a store over an attached storage.
    pub fn new(storage: Arc<dyn KnowledgeStorage>, config: &KnowledgeConfig) -> Self {
        Self {
            storage: RwLock::new(Some(storage)),
            relevance_threshold: config.relevance_threshold,
        }
    }

    /// Create a store whose storage is not ready yet.
    pub fn detached(config: &KnowledgeConfig) -> Self {
        Self {
            storage: RwLock::new(None),
            relevance_threshold: config.relevance_threshold,
        }
    }

    /// Install (or replace) the storage.
    pub async fn attach(&self, storage: Arc<dyn KnowledgeStorage>) {
        *self.storage.write().await = Some(storage);
        info!("Knowledge storage attached");
    }

    pub async fn is_attached(&self) -> bool {
        self.storage.read().await.is_some()
    }

    async fn storage(&self) -> NemuResult<Arc<dyn KnowledgeStorage>> {
        self.storage
            .read()
            .await
            .clone()
            .ok_or_else(|| NemuError::storage_unavailable("knowledge storage is not attached"))
    }

    /// Find the response for `query`, crediting one use on a hit.
    ///
    /// Tiers run in order (exact, relevance, substring) and the first hit
    /// wins. Relevance only runs for queries of two or more words.
    pub async fn lookup(&self, scope: &Scope, query: &str) -> NemuResult<Option<LookupHit>> {
        let storage = self.storage().await?;
        let trigger = normalize_trigger(query);
        if trigger.is_empty() {
            return Ok(None);
        }

        let hit = if let Some(entry) = storage.find_exact(scope, &trigger).await? {
            Some((entry, MatchTier::Exact))
        } else if let Some(scored) = self.relevance(storage.as_ref(), scope, query).await? {
            debug!(score = scored.1, "Relevance tier hit");
            Some((scored.0, MatchTier::Relevance))
        } else {
            storage
                .find_by_substring(scope, &trigger)
                .await?
                .map(|entry| (entry, MatchTier::Substring))
        };

        let Some((mut entry, tier)) = hit else {
            debug!(scope = %scope, "No knowledge matched");
            return Ok(None);
        };

        storage.increment_usage(entry.id).await?;
        entry.usage_count += 1;
        debug!(entry_id = entry.id, ?tier, usage_count = entry.usage_count, "Knowledge matched");

        Ok(Some(LookupHit { entry, tier }))
    }

    async fn relevance(
        &self,
        storage: &dyn KnowledgeStorage,
        scope: &Scope,
        query: &str,
    ) -> NemuResult<Option<(KnowledgeEntry, f32)>> {
        if query.split_whitespace().count() < 2 {
            return Ok(None);
        }
        Ok(storage
            .find_by_relevance(scope, query, self.relevance_threshold)
            .await?
            .map(|scored| (scored.entry, scored.score)))
    }

    /// Store `response` for `trigger`, replacing any previous response in place.
    pub async fn teach(
        &self,
        scope: &Scope,
        trigger: &str,
        response: &str,
        author: &Author,
    ) -> NemuResult<TeachResult> {
        let trigger = normalize_trigger(trigger);
        if trigger.is_empty() {
            return Err(NemuError::empty_text("trigger must not be blank"));
        }
        if response.trim().is_empty() {
            return Err(NemuError::empty_text("response must not be blank"));
        }

        let storage = self.storage().await?;
        let result = storage.upsert(scope, &trigger, response, author).await?;
        info!(scope = %scope, trigger = %trigger, ?result, author_id = author.id, "Knowledge taught");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::storage::{MockKnowledgeStorage, ScoredEntry};
    use chrono::Utc;
    use mockall::predicate::eq;

    fn entry(id: i64, trigger: &str, response: &str, usage_count: u64) -> KnowledgeEntry {
        KnowledgeEntry {
            id,
            scope: Scope::global(),
            trigger: trigger.to_string(),
            response: response.to_string(),
            taught_by: Author::anonymous(1),
            usage_count,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn store(mock: MockKnowledgeStorage) -> KnowledgeStore {
        KnowledgeStore::new(Arc::new(mock), &KnowledgeConfig::default())
    }

    #[tokio::test]
    async fn test_exact_tier_short_circuits() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact()
            .withf(|_, trigger| trigger == "color")
            .returning(|_, _| Ok(Some(entry(1, "color", "blue", 0))));
        mock.expect_find_by_relevance().never();
        mock.expect_find_by_substring().never();
        mock.expect_increment_usage().with(eq(1)).times(1).returning(|_| Ok(()));

        let hit = store(mock)
            .lookup(&Scope::global(), "  Color ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.tier, MatchTier::Exact);
        assert_eq!(hit.entry.response, "blue");
        assert_eq!(hit.entry.usage_count, 1);
    }

    #[tokio::test]
    async fn test_single_word_skips_relevance() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact().returning(|_, _| Ok(None));
        mock.expect_find_by_relevance().never();
        mock.expect_find_by_substring()
            .returning(|_, _| Ok(Some(entry(2, "pythonic", "idiomatic", 3))));
        mock.expect_increment_usage().times(1).returning(|_| Ok(()));

        let hit = store(mock)
            .lookup(&Scope::global(), "python")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.tier, MatchTier::Substring);
        assert_eq!(hit.entry.usage_count, 4);
    }

    #[tokio::test]
    async fn test_relevance_before_substring() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact().returning(|_, _| Ok(None));
        mock.expect_find_by_relevance()
            .withf(|_, query, min| query == "capital of france" && (*min - 0.3).abs() < f32::EPSILON)
            .returning(|_, _, _| {
                Ok(Some(ScoredEntry {
                    entry: entry(3, "what is the capital of france", "Paris", 0),
                    score: 1.2,
                }))
            });
        mock.expect_find_by_substring().never();
        mock.expect_increment_usage().returning(|_| Ok(()));

        let hit = store(mock)
            .lookup(&Scope::global(), "capital of france")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.tier, MatchTier::Relevance);
    }

    #[tokio::test]
    async fn test_no_match_does_not_credit_usage() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact().returning(|_, _| Ok(None));
        mock.expect_find_by_relevance().returning(|_, _, _| Ok(None));
        mock.expect_find_by_substring().returning(|_, _| Ok(None));
        mock.expect_increment_usage().never();

        let hit = store(mock).lookup(&Scope::global(), "who knows").await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_usage_failure_fails_lookup() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact()
            .returning(|_, _| Ok(Some(entry(1, "color", "blue", 0))));
        mock.expect_increment_usage()
            .returning(|_| Err(NemuError::storage("database is locked")));

        let err = store(mock).lookup(&Scope::global(), "color").await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_teach_normalizes_trigger() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_upsert()
            .withf(|_, trigger, response, author| {
                trigger == "what is x" && response == "a letter" && author.id == 9
            })
            .times(1)
            .returning(|_, _, _, _| Ok(TeachResult::Created));

        let result = store(mock)
            .teach(&Scope::global(), " What is X ", "a letter", &Author::anonymous(9))
            .await
            .unwrap();
        assert_eq!(result, TeachResult::Created);
    }

    #[tokio::test]
    async fn test_teach_rejects_blank_response() {
        let mut mock = MockKnowledgeStorage::new();
        mock.expect_upsert().never();
        let err = store(mock)
            .teach(&Scope::global(), "x", "   ", &Author::anonymous(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NemuError::Validation { .. }));
        assert_eq!(err.code(), ErrorCode::ValEmptyText);
    }

    #[tokio::test]
    async fn test_detached_store_is_unavailable() {
        let store = KnowledgeStore::detached(&KnowledgeConfig::default());
        assert!(!store.is_attached().await);

        let err = store.lookup(&Scope::global(), "anything").await.unwrap_err();
        assert!(matches!(err, NemuError::StorageUnavailable { .. }));

        let mut mock = MockKnowledgeStorage::new();
        mock.expect_find_exact().returning(|_, _| Ok(None));
        mock.expect_find_by_substring().returning(|_, _| Ok(None));
        store.attach(Arc::new(mock)).await;
        assert!(store.is_attached().await);
        assert!(store.lookup(&Scope::global(), "anything").await.unwrap().is_none());
    }
}
