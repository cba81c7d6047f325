//! SQLite knowledge storage.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::trigger_index::TriggerIndex;
use super::{KnowledgeStorage, ScoredEntry};
use crate::config::KnowledgeConfig;
use crate::error::{NemuError, NemuResult};
use crate::types::{normalize_trigger, Author, KnowledgeEntry, Scope, TeachResult};

const ENTRY_COLUMNS: &str = "id, scope, trigger_text, response, taught_by_id, taught_by_name, \
                             usage_count, created_at, updated_at";

const DEFAULT_RELEVANCE_CANDIDATES: usize = 10;

/// SQLite-backed knowledge storage with a tantivy index for relevance.
///
/// The `(scope, trigger_text)` unique constraint is the serialization point
/// for teaching; the connection mutex keeps each upsert's read-then-write in
/// one transaction.
pub struct SqliteKnowledgeStorage {
    conn: Mutex<Connection>,
    index: TriggerIndex,
    relevance_candidates: usize,
}

impl SqliteKnowledgeStorage {
    /// Open (or create) a knowledge database. Use `":memory:"` for an ephemeral one.
    pub fn open(db_path: impl AsRef<Path>) -> NemuResult<Self> {
        let path = db_path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        };

        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> NemuResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open the store described by the knowledge configuration.
    pub fn from_config(config: &KnowledgeConfig) -> NemuResult<Self> {
        Ok(Self::open(&config.db_path)?.with_relevance_candidates(config.relevance_candidates))
    }

    /// How many index hits the relevance tier inspects.
    pub fn with_relevance_candidates(mut self, candidates: usize) -> Self {
        self.relevance_candidates = candidates.max(1);
        self
    }

    fn from_connection(conn: Connection) -> NemuResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;

        let storage = Self {
            conn: Mutex::new(conn),
            index: TriggerIndex::in_memory()?,
            relevance_candidates: DEFAULT_RELEVANCE_CANDIDATES,
        };
        storage.rebuild_index()?;
        Ok(storage)
    }

    fn init_schema(conn: &Connection) -> NemuResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nemu_knowledge (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                scope          TEXT NOT NULL,
                trigger_text   TEXT NOT NULL,
                response       TEXT NOT NULL,
                taught_by_id   INTEGER NOT NULL,
                taught_by_name TEXT,
                usage_count    INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL,
                UNIQUE (scope, trigger_text)
            );

            CREATE INDEX IF NOT EXISTS idx_knowledge_scope_usage
                ON nemu_knowledge(scope, usage_count DESC, updated_at DESC);
        "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> NemuResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NemuError::lock_poisoned("knowledge connection"))
    }

    /// Re-index every stored trigger.
    fn rebuild_index(&self) -> NemuResult<usize> {
        let rows: Vec<(i64, String, String)> = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare("SELECT id, scope, trigger_text FROM nemu_knowledge")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let count = self.index.add_batch(
            rows.iter()
                .map(|(id, scope, trigger)| (*id, scope.as_str(), trigger.as_str())),
        )?;
        debug!(count, "Rebuilt trigger index");
        Ok(count)
    }

    /// Fetch an entry without crediting usage.
    pub fn get(&self, scope: &Scope, trigger: &str) -> NemuResult<Option<KnowledgeEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM nemu_knowledge WHERE scope = ?1 AND trigger_text = ?2",
                    ENTRY_COLUMNS
                ),
                params![scope.as_str(), trigger],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Number of entries in a scope.
    pub fn count(&self, scope: &Scope) -> NemuResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nemu_knowledge WHERE scope = ?1",
            params![scope.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl KnowledgeStorage for SqliteKnowledgeStorage {
    async fn find_exact(&self, scope: &Scope, trigger: &str) -> NemuResult<Option<KnowledgeEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM nemu_knowledge \
                     WHERE scope = ?1 AND trigger_text = ?2 \
                     ORDER BY usage_count DESC, updated_at DESC LIMIT 1",
                    ENTRY_COLUMNS
                ),
                params![scope.as_str(), trigger],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    async fn find_by_relevance(
        &self,
        scope: &Scope,
        query: &str,
        min_score: f32,
    ) -> NemuResult<Option<ScoredEntry>> {
        let hits: Vec<(i64, f32)> = self
            .index
            .search(scope, query, self.relevance_candidates)?
            .into_iter()
            .filter(|(_, score)| *score > min_score)
            .collect();
        if hits.is_empty() {
            return Ok(None);
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM nemu_knowledge WHERE id = ?1 AND scope = ?2",
            ENTRY_COLUMNS
        ))?;

        let mut best: Option<ScoredEntry> = None;
        for (id, score) in hits {
            let Some(entry) = stmt
                .query_row(params![id, scope.as_str()], row_to_entry)
                .optional()?
            else {
                continue;
            };

            let better = match &best {
                None => true,
                Some(current) => {
                    score > current.score
                        || (score == current.score && entry.usage_count > current.entry.usage_count)
                }
            };
            if better {
                best = Some(ScoredEntry { entry, score });
            }
        }
        Ok(best)
    }

    async fn find_by_substring(&self, scope: &Scope, query: &str) -> NemuResult<Option<KnowledgeEntry>> {
        let needle = normalize_trigger(query);
        if needle.is_empty() {
            return Ok(None);
        }

        // instr() rather than LIKE: user text must not act as a pattern.
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM nemu_knowledge \
                     WHERE scope = ?1 \
                       AND (instr(trigger_text, ?2) > 0 OR instr(?2, trigger_text) > 0) \
                     ORDER BY usage_count DESC, updated_at DESC LIMIT 1",
                    ENTRY_COLUMNS
                ),
                params![scope.as_str(), needle],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    async fn increment_usage(&self, entry_id: i64) -> NemuResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE nemu_knowledge SET usage_count = usage_count + 1 WHERE id = ?1",
            params![entry_id],
        )?;
        if changed == 0 {
            return Err(NemuError::storage(format!(
                "No knowledge entry with id {}",
                entry_id
            )));
        }
        Ok(())
    }

    async fn upsert(
        &self,
        scope: &Scope,
        trigger: &str,
        response: &str,
        author: &Author,
    ) -> NemuResult<TeachResult> {
        let now = timestamp(Utc::now());

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM nemu_knowledge WHERE scope = ?1 AND trigger_text = ?2",
                params![scope.as_str(), trigger],
                |row| row.get(0),
            )
            .optional()?;

        let (id, result) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE nemu_knowledge \
                     SET response = ?1, taught_by_id = ?2, taught_by_name = ?3, updated_at = ?4 \
                     WHERE id = ?5",
                    params![response, author.id, author.name, now, id],
                )?;
                (id, TeachResult::Updated)
            }
            None => {
                tx.execute(
                    "INSERT INTO nemu_knowledge \
                     (scope, trigger_text, response, taught_by_id, taught_by_name, \
                      usage_count, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                    params![scope.as_str(), trigger, response, author.id, author.name, now],
                )?;
                (tx.last_insert_rowid(), TeachResult::Created)
            }
        };
        tx.commit()?;
        drop(conn);

        // The index is rebuilt on open, so a failure here only delays relevance hits.
        if result == TeachResult::Created {
            if let Err(e) = self.index.add(id, scope, trigger) {
                warn!(entry_id = id, error = %e, "Failed to index new trigger");
            }
        }

        debug!(entry_id = id, scope = %scope, ?result, "Upserted knowledge entry");
        Ok(result)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<KnowledgeEntry> {
    let usage_count: i64 = row.get(6)?;
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        scope: Scope::from_key(row.get::<_, String>(1)?),
        trigger: row.get(2)?,
        response: row.get(3)?,
        taught_by: Author {
            id: row.get(4)?,
            name: row.get(5)?,
        },
        usage_count: usage_count.max(0) as u64,
        created_at: parse_timestamp(7, row.get(7)?)?,
        updated_at: parse_timestamp(8, row.get(8)?)?,
    })
}
