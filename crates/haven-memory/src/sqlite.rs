// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed [`MemoryStore`].
//!
//! All writes go through tokio-rusqlite's single background thread, so the
//! per-record upserts and `access_count + 1` updates are serialized without
//! any extra locking. Embeddings are little-endian f32 BLOBs; tag and id
//! sets are JSON text.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use haven_core::error::HavenError;
use haven_core::traits::PluginAdapter;
use haven_core::types::{AdapterType, HealthStatus, UserId};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::store::MemoryStore;
use crate::types::{
    ConversationSummary, Insight, Memory, MemoryType, SummaryType, blob_to_vec, clamp_importance,
    vec_to_blob,
};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), HavenError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(HavenError::store)?;
    Ok(())
}

/// Convert a tokio-rusqlite error into HavenError::StoreUnavailable.
fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> HavenError {
    HavenError::store(e)
}

fn flatten_call_err(e: tokio_rusqlite::Error<HavenError>) -> HavenError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => HavenError::store(other),
    }
}

/// Fixed-width RFC 3339 so lexical order equals time order.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

const UPSERT_MEMORY: &str = "INSERT INTO memories \
     (user_id, id, date, content, memory_type, importance, tags, access_count, last_accessed, embedding) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
     ON CONFLICT (user_id, id) DO UPDATE SET \
       access_count = MAX(memories.access_count, excluded.access_count), \
       last_accessed = COALESCE(excluded.last_accessed, memories.last_accessed), \
       embedding = COALESCE(memories.embedding, excluded.embedding)";

/// Owned column values for one memory, ready to cross into the DB thread.
struct MemoryParams {
    id: String,
    date: String,
    content: String,
    memory_type: &'static str,
    importance: u8,
    tags: String,
    access_count: u32,
    last_accessed: Option<String>,
    embedding: Option<Vec<u8>>,
}

impl From<&Memory> for MemoryParams {
    fn from(m: &Memory) -> Self {
        Self {
            id: m.id.clone(),
            date: ts(&m.date),
            content: m.content.clone(),
            memory_type: m.memory_type.as_str(),
            importance: m.importance,
            tags: to_json(&m.tags),
            access_count: m.access_count,
            last_accessed: m.last_accessed.as_ref().map(ts),
            embedding: m.embedding.as_deref().map(vec_to_blob),
        }
    }
}

/// Raw row as read from SQLite, converted outside the DB thread.
struct MemoryRow {
    id: String,
    date: String,
    content: String,
    memory_type: String,
    importance: i64,
    tags: String,
    access_count: i64,
    last_accessed: Option<String>,
    embedding: Option<Vec<u8>>,
}

impl MemoryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            date: row.get(1)?,
            content: row.get(2)?,
            memory_type: row.get(3)?,
            importance: row.get(4)?,
            tags: row.get(5)?,
            access_count: row.get(6)?,
            last_accessed: row.get(7)?,
            embedding: row.get(8)?,
        })
    }

    fn into_memory(self) -> Option<Memory> {
        let memory_type = MemoryType::from_str_value(&self.memory_type)?;
        let date = parse_ts(&self.date)?;
        Some(Memory {
            id: self.id,
            date,
            content: self.content,
            memory_type,
            importance: clamp_importance(self.importance),
            tags: serde_json::from_str::<BTreeSet<String>>(&self.tags).unwrap_or_default(),
            access_count: u32::try_from(self.access_count).unwrap_or(0),
            last_accessed: self.last_accessed.as_deref().and_then(parse_ts),
            // Length is re-validated by the relevance engine.
            embedding: self.embedding.as_deref().and_then(blob_to_vec),
        })
    }
}

/// Persistent memory store in a single SQLite file.
pub struct SqliteMemoryStore {
    conn: Connection,
}

impl SqliteMemoryStore {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub async fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, HavenError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(HavenError::store)?;
        }
        let conn = Connection::open(&path).await.map_err(HavenError::store)?;
        debug!(path = %path.display(), "opened memory database");
        Self::init(conn, wal_mode).await
    }

    pub async fn open_in_memory() -> Result<Self, HavenError> {
        let conn = Connection::open_in_memory().await.map_err(HavenError::store)?;
        Self::init(conn, false).await
    }

    async fn init(conn: Connection, wal_mode: bool) -> Result<Self, HavenError> {
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| run_migrations(conn))
            .await
            .map_err(flatten_call_err)?;

        Ok(Self { conn })
    }

    /// Closes the background connection thread.
    pub async fn close(self) -> Result<(), HavenError> {
        self.conn.close().await.map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteMemoryStore {
    fn name(&self) -> &str {
        "sqlite-memory-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, HavenError> {
        let result = self
            .conn
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT 1", [], |row| row.get(0))
            })
            .await;
        Ok(match result {
            Ok(_) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), HavenError> {
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get_memories(&self, user: &UserId) -> Result<Vec<Memory>, HavenError> {
        let user_id = user.as_str().to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<MemoryRow>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, date, content, memory_type, importance, tags, access_count, \
                     last_accessed, embedding FROM memories WHERE user_id = ?1 \
                     ORDER BY date ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id], MemoryRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                let memory = row.into_memory();
                if memory.is_none() {
                    warn!(memory_id = %id, "skipping unreadable memory row");
                }
                memory
            })
            .collect())
    }

    async fn put_memories(&self, user: &UserId, memories: &[Memory]) -> Result<(), HavenError> {
        if memories.is_empty() {
            return Ok(());
        }
        let user_id = user.as_str().to_string();
        let rows: Vec<MemoryParams> = memories.iter().map(MemoryParams::from).collect();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(UPSERT_MEMORY)?;
                    for r in &rows {
                        stmt.execute(rusqlite::params![
                            user_id,
                            r.id,
                            r.date,
                            r.content,
                            r.memory_type,
                            r.importance,
                            r.tags,
                            r.access_count,
                            r.last_accessed,
                            r.embedding,
                        ])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn record_access(
        &self,
        user: &UserId,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), HavenError> {
        if ids.is_empty() {
            return Ok(());
        }
        let user_id = user.as_str().to_string();
        let ids = ids.to_vec();
        let at = ts(&at);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "UPDATE memories SET access_count = access_count + 1, last_accessed = ?3 \
                         WHERE user_id = ?1 AND id = ?2",
                    )?;
                    for id in &ids {
                        stmt.execute(rusqlite::params![user_id, id, at])?;
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_memory(&self, user: &UserId, id: &str) -> Result<bool, HavenError> {
        let user_id = user.as_str().to_string();
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let n = conn.execute(
                    "DELETE FROM memories WHERE user_id = ?1 AND id = ?2",
                    rusqlite::params![user_id, id],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_insights(&self, user: &UserId) -> Result<Vec<Insight>, HavenError> {
        let user_id = user.as_str().to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<(String, String, String, Option<String>, String)>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, date, content, user_note, source FROM insights \
                     WHERE user_id = ?1 ORDER BY date ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, date, content, user_note, source)| {
                Some(Insight {
                    date: parse_ts(&date)?,
                    id,
                    content,
                    user_note,
                    source,
                })
            })
            .collect())
    }

    async fn put_insight(&self, user: &UserId, insight: &Insight) -> Result<(), HavenError> {
        let user_id = user.as_str().to_string();
        let insight = insight.clone();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO insights (user_id, id, date, content, user_note, source) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT (user_id, id) DO UPDATE SET user_note = excluded.user_note",
                    rusqlite::params![
                        user_id,
                        insight.id,
                        ts(&insight.date),
                        insight.content,
                        insight.user_note,
                        insight.source,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn set_insight_note(
        &self,
        user: &UserId,
        id: &str,
        note: Option<String>,
    ) -> Result<bool, HavenError> {
        let user_id = user.as_str().to_string();
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let n = conn.execute(
                    "UPDATE insights SET user_note = ?3 WHERE user_id = ?1 AND id = ?2",
                    rusqlite::params![user_id, id, note],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_summaries(&self, user: &UserId) -> Result<Vec<ConversationSummary>, HavenError> {
        let user_id = user.as_str().to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<[String; 8]>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, date, summary, message_ids, topics, emotional_state, \
                     key_insights, summary_type FROM conversation_summaries \
                     WHERE user_id = ?1 ORDER BY date ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user_id], |row| {
                        Ok([
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ])
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(rows
            .into_iter()
            .filter_map(
                |[id, date, summary, message_ids, topics, emotional_state, key_insights, summary_type]| {
                    Some(ConversationSummary {
                        date: parse_ts(&date)?,
                        id,
                        summary,
                        message_ids: serde_json::from_str(&message_ids).unwrap_or_default(),
                        topics: serde_json::from_str(&topics).unwrap_or_default(),
                        emotional_state,
                        key_insights: serde_json::from_str(&key_insights).unwrap_or_default(),
                        summary_type: SummaryType::from_str_value(&summary_type),
                    })
                },
            )
            .collect())
    }

    async fn put_summary(
        &self,
        user: &UserId,
        summary: &ConversationSummary,
    ) -> Result<(), HavenError> {
        let user_id = user.as_str().to_string();
        let s = summary.clone();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO conversation_summaries \
                     (user_id, id, date, summary, message_ids, topics, emotional_state, key_insights, summary_type) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        user_id,
                        s.id,
                        ts(&s.date),
                        s.summary,
                        to_json(&s.message_ids),
                        to_json(&s.topics),
                        s.emotional_state,
                        to_json(&s.key_insights),
                        s.summary_type.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
