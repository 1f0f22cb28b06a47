// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence boundary for per-user memory collections.
//!
//! Writes are per-record upserts keyed by `(user, id)`, so concurrent
//! ingestion calls never overwrite each other's records. Only the mutable
//! fields change on conflict: the embedding is set once, the access count
//! never decreases.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haven_core::error::HavenError;
use haven_core::types::UserId;
use tokio::sync::RwLock;

use crate::types::{ConversationSummary, Insight, Memory};

/// Storage collaborator for memories, insights and conversation summaries.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// All memories for `user`, oldest first.
    async fn get_memories(&self, user: &UserId) -> Result<Vec<Memory>, HavenError>;

    /// Upserts every record in `memories`.
    async fn put_memories(&self, user: &UserId, memories: &[Memory]) -> Result<(), HavenError>;

    async fn upsert_memory(&self, user: &UserId, memory: &Memory) -> Result<(), HavenError> {
        self.put_memories(user, std::slice::from_ref(memory)).await
    }

    /// Atomically increments the access count of each id and stamps `at`.
    async fn record_access(
        &self,
        user: &UserId,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), HavenError>;

    /// Returns `true` when a record was removed.
    async fn delete_memory(&self, user: &UserId, id: &str) -> Result<bool, HavenError>;

    /// All insights for `user`, oldest first.
    async fn get_insights(&self, user: &UserId) -> Result<Vec<Insight>, HavenError>;

    async fn put_insight(&self, user: &UserId, insight: &Insight) -> Result<(), HavenError>;

    /// Returns `true` when the insight exists.
    async fn set_insight_note(
        &self,
        user: &UserId,
        id: &str,
        note: Option<String>,
    ) -> Result<bool, HavenError>;

    /// All summaries for `user`, oldest first.
    async fn get_summaries(&self, user: &UserId) -> Result<Vec<ConversationSummary>, HavenError>;

    async fn put_summary(
        &self,
        user: &UserId,
        summary: &ConversationSummary,
    ) -> Result<(), HavenError>;
}

/// Folds an incoming record into a stored one.
///
/// Content and metadata are immutable; only the access statistics and a
/// missing embedding are taken from the incoming copy.
pub(crate) fn merge_memory(existing: &mut Memory, incoming: &Memory) {
    existing.access_count = existing.access_count.max(incoming.access_count);
    if incoming.last_accessed.is_some() {
        existing.last_accessed = incoming.last_accessed;
    }
    if existing.embedding.is_none() {
        existing.embedding = incoming.embedding.clone();
    }
}

#[derive(Debug, Default)]
struct UserCollections {
    memories: Vec<Memory>,
    insights: Vec<Insight>,
    summaries: Vec<ConversationSummary>,
}

/// Process-local store, used by tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    users: RwLock<HashMap<UserId, UserCollections>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get_memories(&self, user: &UserId) -> Result<Vec<Memory>, HavenError> {
        let users = self.users.read().await;
        let mut memories = users
            .get(user)
            .map(|c| c.memories.clone())
            .unwrap_or_default();
        memories.sort_by_key(|m| m.date);
        Ok(memories)
    }

    async fn put_memories(&self, user: &UserId, memories: &[Memory]) -> Result<(), HavenError> {
        let mut users = self.users.write().await;
        let collection = users.entry(user.clone()).or_default();
        for incoming in memories {
            match collection.memories.iter_mut().find(|m| m.id == incoming.id) {
                Some(existing) => merge_memory(existing, incoming),
                None => collection.memories.push(incoming.clone()),
            }
        }
        Ok(())
    }

    async fn record_access(
        &self,
        user: &UserId,
        ids: &[String],
        at: DateTime<Utc>,
    ) -> Result<(), HavenError> {
        let mut users = self.users.write().await;
        if let Some(collection) = users.get_mut(user) {
            for memory in collection.memories.iter_mut().filter(|m| ids.contains(&m.id)) {
                memory.record_access(at);
            }
        }
        Ok(())
    }

    async fn delete_memory(&self, user: &UserId, id: &str) -> Result<bool, HavenError> {
        let mut users = self.users.write().await;
        let Some(collection) = users.get_mut(user) else {
            return Ok(false);
        };
        let before = collection.memories.len();
        collection.memories.retain(|m| m.id != id);
        Ok(collection.memories.len() != before)
    }

    async fn get_insights(&self, user: &UserId) -> Result<Vec<Insight>, HavenError> {
        let users = self.users.read().await;
        let mut insights = users
            .get(user)
            .map(|c| c.insights.clone())
            .unwrap_or_default();
        insights.sort_by_key(|i| i.date);
        Ok(insights)
    }

    async fn put_insight(&self, user: &UserId, insight: &Insight) -> Result<(), HavenError> {
        let mut users = self.users.write().await;
        let collection = users.entry(user.clone()).or_default();
        match collection.insights.iter_mut().find(|i| i.id == insight.id) {
            Some(existing) => existing.user_note = insight.user_note.clone(),
            None => collection.insights.push(insight.clone()),
        }
        Ok(())
    }

    async fn set_insight_note(
        &self,
        user: &UserId,
        id: &str,
        note: Option<String>,
    ) -> Result<bool, HavenError> {
        let mut users = self.users.write().await;
        let insight = users
            .get_mut(user)
            .and_then(|c| c.insights.iter_mut().find(|i| i.id == id));
        Ok(match insight {
            Some(insight) => {
                insight.user_note = note;
                true
            }
            None => false,
        })
    }

    async fn get_summaries(&self, user: &UserId) -> Result<Vec<ConversationSummary>, HavenError> {
        let users = self.users.read().await;
        let mut summaries = users
            .get(user)
            .map(|c| c.summaries.clone())
            .unwrap_or_default();
        summaries.sort_by_key(|s| s.date);
        Ok(summaries)
    }

    async fn put_summary(
        &self,
        user: &UserId,
        summary: &ConversationSummary,
    ) -> Result<(), HavenError> {
        let mut users = self.users.write().await;
        let collection = users.entry(user.clone()).or_default();
        if !collection.summaries.iter().any(|s| s.id == summary.id) {
            collection.summaries.push(summary.clone());
        }
        Ok(())
    }
}

/// A store whose every call fails, for exercising degraded paths.
#[cfg(test)]
pub(crate) struct UnavailableStore;

#[cfg(test)]
impl UnavailableStore {
    fn err() -> HavenError {
        HavenError::store(std::io::Error::other("collection could not be decrypted"))
    }
}

#[cfg(test)]
#[async_trait]
impl MemoryStore for UnavailableStore {
    async fn get_memories(&self, _: &UserId) -> Result<Vec<Memory>, HavenError> {
        Err(Self::err())
    }
    async fn put_memories(&self, _: &UserId, _: &[Memory]) -> Result<(), HavenError> {
        Err(Self::err())
    }
    async fn record_access(&self, _: &UserId, _: &[String], _: DateTime<Utc>) -> Result<(), HavenError> {
        Err(Self::err())
    }
    async fn delete_memory(&self, _: &UserId, _: &str) -> Result<bool, HavenError> {
        Err(Self::err())
    }
    async fn get_insights(&self, _: &UserId) -> Result<Vec<Insight>, HavenError> {
        Err(Self::err())
    }
    async fn put_insight(&self, _: &UserId, _: &Insight) -> Result<(), HavenError> {
        Err(Self::err())
    }
    async fn set_insight_note(&self, _: &UserId, _: &str, _: Option<String>) -> Result<bool, HavenError> {
        Err(Self::err())
    }
    async fn get_summaries(&self, _: &UserId) -> Result<Vec<ConversationSummary>, HavenError> {
        Err(Self::err())
    }
    async fn put_summary(&self, _: &UserId, _: &ConversationSummary) -> Result<(), HavenError> {
        Err(Self::err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;

    fn user() -> UserId {
        UserId::from("u1")
    }

    #[tokio::test]
    async fn upsert_keeps_content_and_sets_embedding_once() {
        let store = InMemoryMemoryStore::new();
        let original = Memory::new("I like tea", MemoryType::Preference, 8);
        store.put_memories(&user(), &[original.clone()]).await.unwrap();

        let mut changed = original.clone();
        changed.content = "I like coffee".into();
        changed.embedding = Some(vec![1.0, 2.0]);
        store.upsert_memory(&user(), &changed).await.unwrap();

        let mut again = original.clone();
        again.embedding = Some(vec![9.0, 9.0]);
        store.upsert_memory(&user(), &again).await.unwrap();

        let stored = store.get_memories(&user()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "I like tea");
        assert_eq!(stored[0].embedding, Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn record_access_increments_per_call() {
        let store = InMemoryMemoryStore::new();
        let m = Memory::new("x", MemoryType::Goal, 5);
        store.put_memories(&user(), &[m.clone()]).await.unwrap();
        let at = Utc::now();
        store.record_access(&user(), &[m.id.clone()], at).await.unwrap();
        store.record_access(&user(), &[m.id.clone()], at).await.unwrap();
        let stored = store.get_memories(&user()).await.unwrap();
        assert_eq!(stored[0].access_count, 2);
        assert_eq!(stored[0].last_accessed, Some(at));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = InMemoryMemoryStore::new();
        store
            .put_memories(&user(), &[Memory::new("mine", MemoryType::Goal, 5)])
            .await
            .unwrap();
        assert!(store.get_memories(&UserId::from("u2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_whether_removed() {
        let store = InMemoryMemoryStore::new();
        let m = Memory::new("x", MemoryType::Goal, 5);
        store.put_memories(&user(), &[m.clone()]).await.unwrap();
        assert!(store.delete_memory(&user(), &m.id).await.unwrap());
        assert!(!store.delete_memory(&user(), &m.id).await.unwrap());
    }

    #[tokio::test]
    async fn insight_note_can_be_set() {
        let store = InMemoryMemoryStore::new();
        let insight = Insight::from_assistant("Evenings are harder");
        store.put_insight(&user(), &insight).await.unwrap();
        assert!(store
            .set_insight_note(&user(), &insight.id, Some("so true".into()))
            .await
            .unwrap());
        assert!(!store.set_insight_note(&user(), "nope", None).await.unwrap());
        let stored = store.get_insights(&user()).await.unwrap();
        assert_eq!(stored[0].user_note.as_deref(), Some("so true"));
    }

    #[tokio::test]
    async fn concurrent_puts_lose_nothing() {
        let store = std::sync::Arc::new(InMemoryMemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let m = Memory::new(format!("fact {i}"), MemoryType::PersonalDetail, 8);
                store.put_memories(&UserId::from("u1"), &[m]).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get_memories(&user()).await.unwrap().len(), 16);
    }
}
