// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt context for a chat turn.
//!
//! MemoryProvider reads the user's collections, ranks them against the
//! current message and renders the context block. An unavailable store
//! degrades to "no context"; nothing here fails the turn.

use std::sync::Arc;

use chrono::Utc;
use haven_core::error::HavenError;
use haven_core::types::UserId;
use tracing::{debug, warn};

use crate::formatter::format_with_summary;
use crate::retriever::{RelevanceEngine, Retrieval};
use crate::store::MemoryStore;
use crate::types::{ConversationSummary, Insight, Memory};

/// Retrieval plus formatting over a [`MemoryStore`].
pub struct MemoryProvider {
    store: Arc<dyn MemoryStore>,
    engine: Arc<RelevanceEngine>,
}

impl MemoryProvider {
    pub fn new(store: Arc<dyn MemoryStore>, engine: Arc<RelevanceEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// The user's memories, or an empty collection when the store is down.
    pub async fn load_memories(&self, user: &UserId) -> Vec<Memory> {
        absorb(user, "memories", self.store.get_memories(user).await)
    }

    /// Ranks the user's memories against `query`.
    ///
    /// Access statistics are persisted only when the vector path ran, since
    /// only that path bumps them.
    pub async fn relevant_memories(&self, user: &UserId, query: &str, k: usize) -> Retrieval {
        let memories = self.load_memories(user).await;
        let retrieval = self.engine.retrieve(query, &memories, k).await;
        debug!(
            user = %user,
            candidates = memories.len(),
            returned = retrieval.memories.len(),
            path = ?retrieval.path,
            "retrieved memories"
        );

        if retrieval.updates_access() {
            if let Err(e) = self
                .store
                .record_access(user, &retrieval.ids(), Utc::now())
                .await
            {
                warn!(user = %user, error = %e, "failed to persist access statistics");
            }
        }
        retrieval
    }

    /// The most recent insight, if any.
    pub async fn pinned_insight(&self, user: &UserId) -> Option<Insight> {
        absorb(user, "insights", self.store.get_insights(user).await)
            .into_iter()
            .max_by_key(|i| i.date)
    }

    pub async fn latest_summary(&self, user: &UserId) -> Option<ConversationSummary> {
        absorb(user, "summaries", self.store.get_summaries(user).await)
            .into_iter()
            .max_by_key(|s| s.date)
    }

    /// The formatted context block for `query`; empty when there is nothing
    /// worth injecting.
    pub async fn provide_context(&self, user: &UserId, query: &str, k: usize) -> String {
        let memories = self.relevant_memories(user, query, k).await.into_memories();
        let insight = self.pinned_insight(user).await;
        let summary = self.latest_summary(user).await;
        format_with_summary(&memories, insight.as_ref(), summary.as_ref())
    }
}

fn absorb<T>(user: &UserId, what: &str, result: Result<Vec<T>, HavenError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        warn!(user = %user, collection = what, error = %e, "store unavailable, continuing without it");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::formatter::CONTEXT_HEADER;
    use crate::retriever::{RelevanceSettings, RetrievalPath};
    use crate::store::{InMemoryMemoryStore, UnavailableStore};
    use crate::types::MemoryType;
    use chrono::Duration;
    use haven_test_utils::MockEmbedder;

    fn provider(store: Arc<dyn MemoryStore>, embedder: Embedder) -> MemoryProvider {
        let engine = RelevanceEngine::new(Arc::new(embedder), RelevanceSettings::default());
        MemoryProvider::new(store, Arc::new(engine))
    }

    fn user() -> UserId {
        UserId::from("u1")
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn unavailable_store_yields_empty_context() {
        let provider = provider(Arc::new(UnavailableStore), Embedder::fallback_only(3, 100));
        let context = provider.provide_context(&user(), "hello", 5).await;
        assert_eq!(context, "");
        assert!(logs_contain("store unavailable"));
    }

    #[tokio::test]
    async fn empty_store_yields_empty_context_without_provider_call() {
        let mock = Arc::new(MockEmbedder::new(3));
        let provider = provider(
            Arc::new(InMemoryMemoryStore::new()),
            Embedder::new(mock.clone(), 3, 100),
        );
        assert_eq!(provider.provide_context(&user(), "hello", 5).await, "");
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn vector_path_persists_access() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let m = Memory::new("walks help", MemoryType::CopingStrategy, 8).with_embedding(vec![1.0, 0.0, 0.0]);
        store.put_memories(&user(), &[m.clone()]).await.unwrap();

        let provider = provider(
            store.clone(),
            Embedder::new(Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0])), 3, 100),
        );
        let retrieval = provider.relevant_memories(&user(), "walks", 1).await;
        assert_eq!(retrieval.path, RetrievalPath::Vector);

        let stored = store.get_memories(&user()).await.unwrap();
        assert_eq!(stored[0].access_count, 1);
        assert!(stored[0].last_accessed.is_some());
    }

    #[tokio::test]
    async fn heuristic_path_leaves_access_untouched() {
        let store = Arc::new(InMemoryMemoryStore::new());
        store
            .put_memories(&user(), &[Memory::new("walks help", MemoryType::CopingStrategy, 8)])
            .await
            .unwrap();
        let provider = provider(store.clone(), Embedder::fallback_only(3, 100));
        let retrieval = provider.relevant_memories(&user(), "walks", 1).await;
        assert_eq!(retrieval.path, RetrievalPath::Heuristic);
        assert_eq!(store.get_memories(&user()).await.unwrap()[0].access_count, 0);
    }

    #[tokio::test]
    async fn latest_insight_is_pinned() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let mut old = Insight::from_assistant("older observation");
        old.date = Utc::now() - Duration::days(3);
        let new = Insight::from_assistant("newer observation");
        store.put_insight(&user(), &new).await.unwrap();
        store.put_insight(&user(), &old).await.unwrap();

        let provider = provider(store, Embedder::fallback_only(3, 100));
        assert_eq!(
            provider.pinned_insight(&user()).await.map(|i| i.content),
            Some("newer observation".to_string())
        );
        let context = provider.provide_context(&user(), "anything", 5).await;
        assert!(context.starts_with(CONTEXT_HEADER));
        assert!(context.contains("newer observation"));
        assert!(!context.contains("older observation"));
    }
}
