//! Per-user interaction statistics.
//!
//! Statistics are a side channel: a failing sink is logged by the engine and
//! never changes what a user sees.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{NemuError, NemuResult};
use crate::types::Author;

/// Something a user did that is worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    /// Sent a message nemu acted on.
    Message,
    /// Got an answer from nemu.
    Helped,
    /// Taught nemu something.
    Taught,
}

/// Counters kept for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: i64,
    pub name: Option<String>,
    pub total_messages: u64,
    pub times_helped: u64,
    pub times_taught: u64,
    pub first_interaction: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
}

/// Receiver of interaction records.
#[async_trait]
pub trait InteractionSink: Send + Sync {
    async fn record(&self, author: &Author, interaction: Interaction) -> NemuResult<()>;
}

/// Sink that drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInteractionSink;

#[async_trait]
impl InteractionSink for NoopInteractionSink {
    async fn record(&self, _author: &Author, _interaction: Interaction) -> NemuResult<()> {
        Ok(())
    }
}

/// SQLite-backed interaction counters, one row per user.
pub struct SqliteInteractionStats {
    conn: Mutex<Connection>,
}

impl SqliteInteractionStats {
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

    pub fn in_memory() -> NemuResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> NemuResult<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nemu_interactions (
                user_id           INTEGER PRIMARY KEY,
                name              TEXT,
                total_messages    INTEGER NOT NULL DEFAULT 0,
                times_helped      INTEGER NOT NULL DEFAULT 0,
                times_taught      INTEGER NOT NULL DEFAULT 0,
                first_interaction TEXT NOT NULL,
                last_interaction  TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Counters for one user, if they ever interacted.
    pub fn stats(&self, user_id: i64) -> NemuResult<Option<UserStats>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| NemuError::lock_poisoned("interaction stats"))?;

        let row = conn
            .query_row(
                "SELECT user_id, name, total_messages, times_helped, times_taught, \
                        first_interaction, last_interaction \
                 FROM nemu_interactions WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, name, messages, helped, taught, first, last)) = row else {
            return Ok(None);
        };

        Ok(Some(UserStats {
            user_id,
            name,
            total_messages: messages.max(0) as u64,
            times_helped: helped.max(0) as u64,
            times_taught: taught.max(0) as u64,
            first_interaction: parse_timestamp(&first)?,
            last_interaction: parse_timestamp(&last)?,
        }))
    }
}

#[async_trait]
impl InteractionSink for SqliteInteractionStats {
    async fn record(&self, author: &Author, interaction: Interaction) -> NemuResult<()> {
        let (messages, helped, taught) = match interaction {
            Interaction::Message => (1, 0, 0),
            Interaction::Helped => (0, 1, 0),
            Interaction::Taught => (0, 0, 1),
        };
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let conn = self
            .conn
            .lock()
            .map_err(|_| NemuError::lock_poisoned("interaction stats"))?;
        conn.execute(
            "INSERT INTO nemu_interactions \
             (user_id, name, total_messages, times_helped, times_taught, \
              first_interaction, last_interaction) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) \
             ON CONFLICT(user_id) DO UPDATE SET \
                name = COALESCE(excluded.name, nemu_interactions.name), \
                total_messages = nemu_interactions.total_messages + excluded.total_messages, \
                times_helped = nemu_interactions.times_helped + excluded.times_helped, \
                times_taught = nemu_interactions.times_taught + excluded.times_taught, \
                last_interaction = excluded.last_interaction",
            params![author.id, author.name, messages, helped, taught, now],
        )?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> NemuResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NemuError::storage(format!("Invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_accumulate_per_user() {
        let stats = SqliteInteractionStats::in_memory().unwrap();
        let ada = Author::new(1, "ada");

        stats.record(&ada, Interaction::Message).await.unwrap();
        stats.record(&ada, Interaction::Message).await.unwrap();
        stats.record(&ada, Interaction::Helped).await.unwrap();
        stats.record(&ada, Interaction::Taught).await.unwrap();
        stats
            .record(&Author::anonymous(2), Interaction::Message)
            .await
            .unwrap();

        let row = stats.stats(1).unwrap().unwrap();
        assert_eq!(row.name.as_deref(), Some("ada"));
        assert_eq!(row.total_messages, 2);
        assert_eq!(row.times_helped, 1);
        assert_eq!(row.times_taught, 1);
        assert!(row.last_interaction >= row.first_interaction);

        assert_eq!(stats.stats(2).unwrap().unwrap().total_messages, 1);
        assert!(stats.stats(3).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_anonymous_record_keeps_known_name() {
        let stats = SqliteInteractionStats::in_memory().unwrap();
        stats.record(&Author::new(5, "grace"), Interaction::Message).await.unwrap();
        stats.record(&Author::anonymous(5), Interaction::Message).await.unwrap();

        let row = stats.stats(5).unwrap().unwrap();
        assert_eq!(row.name.as_deref(), Some("grace"));
        assert_eq!(row.total_messages, 2);
    }
}
