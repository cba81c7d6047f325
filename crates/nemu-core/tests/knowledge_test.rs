//! Integration tests for lookup, teaching and correlation.
//!
//! Runs the engine end to end against the SQLite + tantivy store.

use std::sync::Arc;

use nemu_core::{
    Author, Classification, KnowledgeEngine, KnowledgeStorage, KnowledgeStore, MatchTier,
    NemuConfig, NemuError, Scope, SharingMode, SqliteKnowledgeStorage, TeachOutcome, TeachResult,
};

fn config() -> NemuConfig {
    NemuConfig::builder()
        .db_path(":memory:")
        .decoration_probability(0.0)
        .build()
}

fn ada() -> Author {
    Author::new(1, "ada")
}

fn sqlite_store() -> (Arc<SqliteKnowledgeStorage>, KnowledgeStore) {
    let storage = Arc::new(SqliteKnowledgeStorage::in_memory().unwrap());
    let store = KnowledgeStore::new(storage.clone(), &config().knowledge);
    (storage, store)
}

/// Teaching the same trigger twice updates in place.
#[tokio::test]
async fn test_reteach_is_idempotent() {
    let (storage, store) = sqlite_store();
    let scope = Scope::conversation("a");

    assert_eq!(
        store.teach(&scope, "Color", "blue", &ada()).await.unwrap(),
        TeachResult::Created
    );
    store.lookup(&scope, "color").await.unwrap().unwrap();
    assert_eq!(
        store.teach(&scope, "color ", "green", &ada()).await.unwrap(),
        TeachResult::Updated
    );

    assert_eq!(storage.count(&scope).unwrap(), 1);
    let entry = storage.get(&scope, "color").unwrap().unwrap();
    assert_eq!(entry.response, "green");
    assert_eq!(entry.usage_count, 1);
}

/// An exact match wins over a more popular substring match.
#[tokio::test]
async fn test_exact_tier_beats_substring_usage() {
    let (_storage, store) = sqlite_store();
    let scope = Scope::global();

    store.teach(&scope, "sky", "up", &ada()).await.unwrap();
    store
        .teach(&scope, "sky colour at night", "black", &ada())
        .await
        .unwrap();
    for _ in 0..5 {
        store.lookup(&scope, "sky colour at night").await.unwrap();
    }

    let hit = store.lookup(&scope, "sky").await.unwrap().unwrap();
    assert_eq!(hit.tier, MatchTier::Exact);
    assert_eq!(hit.entry.response, "up");
}

#[tokio::test]
async fn test_substring_tier_when_nothing_else_matches() {
    let (_storage, store) = sqlite_store();
    let scope = Scope::global();
    store.teach(&scope, "pythonista", "a python fan", &ada()).await.unwrap();

    let hit = store.lookup(&scope, "python").await.unwrap().unwrap();
    assert_eq!(hit.tier, MatchTier::Substring);
    assert_eq!(hit.entry.usage_count, 1);
}

/// Sharing only function words with a trigger is a miss, not a relevance hit.
#[tokio::test]
async fn test_unrelated_query_is_a_miss() {
    let (_storage, store) = sqlite_store();
    let scope = Scope::conversation("a");
    store
        .teach(&scope, "what is the capital of france", "Paris", &ada())
        .await
        .unwrap();
    store.teach(&scope, "favourite colour", "blue", &ada()).await.unwrap();

    for query in ["what is love", "is it raining", "the weather today"] {
        let hit = store.lookup(&scope, query).await.unwrap();
        assert!(hit.is_none(), "{} matched {:?}", query, hit.map(|h| h.entry.response));
    }

    let hit = store
        .lookup(&scope, "capital of france please")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.tier, MatchTier::Relevance);
    assert_eq!(hit.entry.response, "Paris");
}

#[tokio::test]
async fn test_scopes_do_not_leak() {
    let (_storage, store) = sqlite_store();
    store
        .teach(&Scope::conversation("chatA"), "color", "blue", &ada())
        .await
        .unwrap();

    assert!(store
        .lookup(&Scope::conversation("chatB"), "color")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .lookup(&Scope::conversation("chatA"), "color")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_prompt_is_consumed_once() {
    let engine = KnowledgeEngine::open(&config()).unwrap();
    let scope = engine.scope_for(1);
    engine.on_prompt_sent(42, scope.clone(), "what is X");

    assert_eq!(
        engine.on_reply(42, "X is a thing", &ada()).await,
        TeachOutcome::Learned
    );
    assert_eq!(
        engine.on_reply(42, "X is another thing", &ada()).await,
        TeachOutcome::NotATeachingReply
    );
    assert_eq!(
        engine.answer(&scope, "what is x").await.as_deref(),
        Some("X is a thing")
    );
}

#[tokio::test]
async fn test_only_recent_prompts_are_resolvable() {
    let engine = KnowledgeEngine::open(&config()).unwrap();
    let scope = engine.scope_for(1);
    for id in 0..150 {
        engine.on_prompt_sent(id, scope.clone(), &format!("question {}", id));
    }

    for id in 0..50 {
        assert_eq!(
            engine.on_reply(id, "late", &ada()).await,
            TeachOutcome::NotATeachingReply
        );
    }
    for id in 50..150 {
        assert_eq!(
            engine.on_reply(id, "answer", &ada()).await,
            TeachOutcome::Learned
        );
    }
}

#[test]
fn test_extraction_examples() {
    let engine = KnowledgeEngine::new(&config(), None).unwrap();
    assert_eq!(
        engine.classify("Hey nemu, what's up", false, true),
        Classification::Respond("what's up".to_string())
    );
    assert_eq!(
        engine.classify("no trigger here", false, true),
        Classification::Ignore
    );
    assert_eq!(engine.classify("nemu ok", false, true), Classification::Ignore);
}

#[tokio::test]
async fn test_index_is_rebuilt_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("knowledge.db");

    {
        let storage = SqliteKnowledgeStorage::open(&path).unwrap();
        for (trigger, response) in [
            ("what is the capital of france", "Paris"),
            ("favourite colour", "blue"),
            ("how old are you", "timeless"),
            ("tell me a joke", "no"),
        ] {
            storage
                .upsert(&Scope::global(), trigger, response, &ada())
                .await
                .unwrap();
        }
    }

    let storage = Arc::new(SqliteKnowledgeStorage::open(&path).unwrap());
    let store = KnowledgeStore::new(storage, &config().knowledge);

    let hit = store
        .lookup(&Scope::global(), "capital city of france")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.tier, MatchTier::Relevance);
    assert_eq!(hit.entry.response, "Paris");
}

#[tokio::test]
async fn test_detached_store_reports_unavailable() {
    let store = KnowledgeStore::detached(&config().knowledge);
    let err = store
        .teach(&Scope::global(), "color", "blue", &ada())
        .await
        .unwrap_err();
    assert!(matches!(err, NemuError::StorageUnavailable { .. }));

    store
        .attach(Arc::new(SqliteKnowledgeStorage::in_memory().unwrap()))
        .await;
    assert_eq!(
        store
            .teach(&Scope::global(), "color", "blue", &ada())
            .await
            .unwrap(),
        TeachResult::Created
    );
}

#[tokio::test]
async fn test_concurrent_teaching_creates_one_entry() {
    let storage = Arc::new(SqliteKnowledgeStorage::in_memory().unwrap());
    let store = Arc::new(KnowledgeStore::new(storage.clone(), &config().knowledge));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .teach(&Scope::global(), "race", &format!("answer {}", i), &Author::anonymous(i))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.unwrap() == TeachResult::Created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(storage.count(&Scope::global()).unwrap(), 1);
}

#[tokio::test]
async fn test_global_mode_shares_knowledge() {
    let config = NemuConfig::builder()
        .db_path(":memory:")
        .sharing(SharingMode::Global)
        .decoration_probability(0.0)
        .build();
    let engine = KnowledgeEngine::open(&config).unwrap();
    assert_eq!(engine.scope_for(1), engine.scope_for(2));

    engine.on_prompt_sent(7, engine.scope_for(1), "color");
    assert_eq!(engine.on_reply(7, "blue", &ada()).await, TeachOutcome::Learned);
    assert_eq!(
        engine.answer(&engine.scope_for(2), "color").await.as_deref(),
        Some("blue")
    );
}

#[tokio::test]
async fn test_storage_trait_object_is_usable() {
    let storage: Arc<dyn KnowledgeStorage> = Arc::new(SqliteKnowledgeStorage::in_memory().unwrap());
    storage
        .upsert(&Scope::global(), "ping", "pong", &ada())
        .await
        .unwrap();
    let entry = storage
        .find_exact(&Scope::global(), "ping")
        .await
        .unwrap()
        .unwrap();
    storage.increment_usage(entry.id).await.unwrap();
    assert_eq!(
        storage
            .find_exact(&Scope::global(), "ping")
            .await
            .unwrap()
            .unwrap()
            .usage_count,
        1
    );
}
