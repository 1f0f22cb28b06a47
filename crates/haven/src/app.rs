// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Application lifecycle: builds the memory engine from configuration and
//! tears it down again.

use std::sync::Arc;

use haven_config::model::HavenConfig;
use haven_core::error::HavenError;
use haven_core::traits::{EmbeddingAdapter, PluginAdapter};
use haven_core::types::{HealthStatus, UserId};
use haven_memory::extractor::{DomainEvent, UrgeLevel};
use haven_memory::{
    Embedder, HttpEmbedder, Insight, Memory, MemoryExtractor, MemoryProvider, MemoryStore,
    MemoryType, RelevanceEngine, RelevanceSettings, SqliteMemoryStore,
};
use secrecy::SecretString;
use tracing::{info, warn};

/// Everything a command needs, owned by `main` for the life of the process.
pub struct App {
    pub config: HavenConfig,
    store: Arc<SqliteMemoryStore>,
    adapter: Option<Arc<dyn EmbeddingAdapter>>,
    provider: MemoryProvider,
    extractor: Arc<MemoryExtractor>,
}

impl App {
    /// Opens the store and builds the embedder from `config`.
    ///
    /// The HTTP embedder is only wired in when embeddings are enabled and an
    /// API key is configured; otherwise every vector comes from the fallback
    /// generator.
    pub async fn init(config: HavenConfig) -> Result<Self, HavenError> {
        let adapter: Option<Arc<dyn EmbeddingAdapter>> =
            match (config.embedding.enabled, config.embedding.api_key.clone()) {
                (true, Some(key)) if !key.trim().is_empty() => {
                    let embedder = HttpEmbedder::new(&config.embedding, SecretString::from(key))?;
                    Some(Arc::new(embedder) as Arc<dyn EmbeddingAdapter>)
                }
                (true, _) => {
                    warn!("no embedding API key configured, using fallback vectors");
                    None
                }
                (false, _) => None,
            };
        Self::init_with_adapter(config, adapter).await
    }

    /// [`App::init`] with an explicit embedding adapter.
    pub async fn init_with_adapter(
        config: HavenConfig,
        adapter: Option<Arc<dyn EmbeddingAdapter>>,
    ) -> Result<Self, HavenError> {
        let store = Arc::new(
            SqliteMemoryStore::open(&config.storage.database_path, config.storage.wal_mode).await?,
        );
        let embedder = Arc::new(Embedder::from_config(adapter.clone(), &config.embedding));
        let engine = Arc::new(RelevanceEngine::new(
            embedder.clone(),
            RelevanceSettings::from(&config.retrieval),
        ));
        let dyn_store: Arc<dyn MemoryStore> = store.clone();
        let provider = MemoryProvider::new(dyn_store.clone(), engine);
        let extractor = Arc::new(
            MemoryExtractor::new(dyn_store, embedder).with_enabled(config.ingestion.enabled),
        );

        info!(
            database = %config.storage.database_path,
            remote_embeddings = adapter.is_some(),
            "memory engine initialized"
        );
        Ok(Self {
            config,
            store,
            adapter,
            provider,
            extractor,
        })
    }

    /// Waits for background ingestion and closes the store.
    pub async fn dispose(self) -> Result<(), HavenError> {
        self.extractor.flush().await;
        if let Some(adapter) = &self.adapter {
            adapter.shutdown().await?;
        }
        let Self {
            store,
            provider,
            extractor,
            ..
        } = self;
        drop(provider);
        drop(extractor);
        match Arc::try_unwrap(store) {
            Ok(store) => store.close().await,
            Err(_) => {
                warn!("memory store still shared at shutdown, leaving connection to drop");
                Ok(())
            }
        }
    }

    /// The formatted context block for `query`.
    pub async fn recall(&self, user: &UserId, query: &str, k: Option<usize>) -> String {
        let k = k.unwrap_or(self.config.retrieval.max_results);
        self.provider.provide_context(user, query, k).await
    }

    pub async fn remember(
        &self,
        user: &UserId,
        content: &str,
        memory_type: MemoryType,
        importance: i64,
        tags: &[String],
    ) -> Result<Memory, HavenError> {
        let memory = Memory::new(content.trim(), memory_type, importance).with_tags(tags.iter().cloned());
        self.extractor.remember(user, memory).await
    }

    pub async fn check_in(
        &self,
        user: &UserId,
        mood: &str,
        urge: UrgeLevel,
        note: Option<String>,
    ) -> Result<Vec<Memory>, HavenError> {
        let event = DomainEvent::CheckIn {
            mood: mood.to_string(),
            urge,
            note,
        };
        self.extractor.ingest(user, &event).await
    }

    pub async fn record(&self, user: &UserId, event: DomainEvent) -> Result<Vec<Memory>, HavenError> {
        self.extractor.ingest(user, &event).await
    }

    pub async fn list(&self, user: &UserId) -> Result<Vec<Memory>, HavenError> {
        self.store.get_memories(user).await
    }

    pub async fn forget(&self, user: &UserId, id: &str) -> Result<bool, HavenError> {
        self.store.delete_memory(user, id).await
    }

    pub async fn insights(&self, user: &UserId) -> Result<Vec<Insight>, HavenError> {
        self.store.get_insights(user).await
    }

    pub async fn annotate_insight(
        &self,
        user: &UserId,
        id: &str,
        note: Option<String>,
    ) -> Result<bool, HavenError> {
        self.store.set_insight_note(user, id, note).await
    }

    /// Health of every adapter, by name.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut report = Vec::new();
        report.push((
            self.store.name().to_string(),
            self.store
                .health_check()
                .await
                .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string())),
        ));
        match &self.adapter {
            Some(adapter) => report.push((
                adapter.name().to_string(),
                adapter
                    .health_check()
                    .await
                    .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string())),
            )),
            None => report.push((
                "embedding".to_string(),
                HealthStatus::Degraded("fallback vectors only".to_string()),
            )),
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_test_utils::MockEmbedder;

    fn config(dir: &tempfile::TempDir) -> HavenConfig {
        let mut config = HavenConfig::default();
        config.storage.database_path = dir.path().join("haven.db").to_string_lossy().into_owned();
        config.embedding.dimensions = 16;
        config
    }

    fn user() -> UserId {
        UserId::from("local")
    }

    #[tokio::test]
    async fn remember_then_recall_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::init_with_adapter(config(&dir), Some(Arc::new(MockEmbedder::new(16))))
            .await
            .unwrap();

        let saved = app
            .remember(&user(), "Walks calm my cravings", MemoryType::CopingStrategy, 8, &["walk".into()])
            .await
            .unwrap();
        assert_eq!(saved.embedding.as_ref().map(Vec::len), Some(16));

        let context = app.recall(&user(), "Walks calm my cravings", None).await;
        assert!(context.contains("[1] COPING STRATEGY"));
        assert!(context.contains("Walks calm my cravings"));
        app.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn data_survives_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::init(config(&dir)).await.unwrap();
        app.check_in(&user(), "shaky", UrgeLevel::Strong, None).await.unwrap();
        app.dispose().await.unwrap();

        let app = App::init(config(&dir)).await.unwrap();
        let memories = app.list(&user()).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].importance, 9);
        assert!(app.forget(&user(), &memories[0].id).await.unwrap());
        assert!(app.list(&user()).await.unwrap().is_empty());
        app.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn missing_api_key_reports_degraded_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::init(config(&dir)).await.unwrap();
        let health = app.health().await;
        assert_eq!(health[0].1, HealthStatus::Healthy);
        assert!(matches!(health[1].1, HealthStatus::Degraded(_)));
        app.dispose().await.unwrap();
    }
}
