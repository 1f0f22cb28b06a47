// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relevance engine: picks the k memories most relevant to a query.
//!
//! Two paths share one entry point:
//!
//! 1. **Vector path** when enough memories carry a valid embedding. The
//!    query is embedded (falling back to the deterministic vector on
//!    provider failure), memories are ranked by cosine similarity, and only
//!    strictly positive similarities survive. Returned copies get their
//!    access statistics bumped.
//! 2. **Heuristic path** otherwise, or when the vector path cannot fill k
//!    slots. Memories are ranked by a blend of topic overlap, emotion match,
//!    importance, recency and access frequency. Access statistics are left
//!    untouched.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use haven_config::model::RetrievalConfig;
use tracing::debug;

use crate::classifier::{Emotion, Topic, detect_emotion, detect_topics};
use crate::embedder::Embedder;
use crate::types::{Memory, ScoredMemory, cosine_similarity};

/// Weights of the heuristic blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalWeights {
    pub base: f64,
    pub recency: f64,
    pub importance: f64,
    pub access: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            base: 0.4,
            recency: 0.4,
            importance: 0.4,
            access: 0.2,
        }
    }
}

/// Tunables of the relevance engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceSettings {
    pub vector_search: bool,
    pub vector_valid_ratio: f64,
    pub emotion_bonus: f64,
    pub recency_window_days: f64,
    pub topic_scale: f64,
    pub weights: RetrievalWeights,
}

impl Default for RelevanceSettings {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RelevanceSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_search: config.vector_search,
            vector_valid_ratio: config.vector_valid_ratio,
            emotion_bonus: config.emotion_bonus,
            recency_window_days: config.recency_window_days,
            topic_scale: config.topic_scale,
            weights: RetrievalWeights {
                base: config.weights.base,
                recency: config.weights.recency,
                importance: config.weights.importance,
                access: config.weights.access,
            },
        }
    }
}

/// Which ranking produced a [`Retrieval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    /// No candidates, or k was zero.
    Empty,
    Vector,
    Heuristic,
}

/// Result of one retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub memories: Vec<ScoredMemory>,
    pub path: RetrievalPath,
}

impl Retrieval {
    fn empty() -> Self {
        Self {
            memories: Vec::new(),
            path: RetrievalPath::Empty,
        }
    }

    /// Whether the returned copies carry bumped access statistics that the
    /// caller should persist.
    pub fn updates_access(&self) -> bool {
        self.path == RetrievalPath::Vector
    }

    pub fn ids(&self) -> Vec<String> {
        self.memories.iter().map(|s| s.memory.id.clone()).collect()
    }

    pub fn into_memories(self) -> Vec<Memory> {
        self.memories.into_iter().map(|s| s.memory).collect()
    }
}

/// Ranks a user's memories against a query.
pub struct RelevanceEngine {
    embedder: Arc<Embedder>,
    settings: RelevanceSettings,
}

impl RelevanceEngine {
    pub fn new(embedder: Arc<Embedder>, settings: RelevanceSettings) -> Self {
        Self { embedder, settings }
    }

    pub fn settings(&self) -> &RelevanceSettings {
        &self.settings
    }

    /// Retrieves up to `k` memories relevant to `query`.
    ///
    /// Never fails: every error on the vector path degrades to the heuristic
    /// ranking. Duplicate ids in `memories` keep their first occurrence.
    pub async fn retrieve(&self, query: &str, memories: &[Memory], k: usize) -> Retrieval {
        self.retrieve_at(query, memories, k, Utc::now()).await
    }

    /// [`RelevanceEngine::retrieve`] with an explicit clock.
    pub async fn retrieve_at(
        &self,
        query: &str,
        memories: &[Memory],
        k: usize,
        now: DateTime<Utc>,
    ) -> Retrieval {
        let candidates = dedup_by_id(memories);
        if candidates.is_empty() || k == 0 {
            return Retrieval::empty();
        }

        if self.vector_eligible(&candidates) {
            if let Some(scored) = self.vector_rank(query, &candidates, k, now).await {
                return Retrieval {
                    memories: scored,
                    path: RetrievalPath::Vector,
                };
            }
        }

        Retrieval {
            memories: self.heuristic_rank(query, &candidates, k, now),
            path: RetrievalPath::Heuristic,
        }
    }

    fn vector_eligible(&self, candidates: &[&Memory]) -> bool {
        if !self.settings.vector_search {
            return false;
        }
        let valid = candidates
            .iter()
            .filter(|m| self.valid_embedding(m).is_some())
            .count();
        let ratio = valid as f64 / candidates.len() as f64;
        debug!(valid, total = candidates.len(), ratio, "embedding coverage");
        ratio >= self.settings.vector_valid_ratio
    }

    fn valid_embedding<'a>(&self, memory: &'a Memory) -> Option<&'a [f32]> {
        memory
            .embedding
            .as_deref()
            .filter(|v| self.embedder.is_valid(v))
    }

    async fn vector_rank(
        &self,
        query: &str,
        candidates: &[&Memory],
        k: usize,
        now: DateTime<Utc>,
    ) -> Option<Vec<ScoredMemory>> {
        let query_embedding = match self.embedder.embed_or_fallback(query).await {
            Ok(v) if self.embedder.is_valid(&v) => v,
            Ok(_) => return None,
            Err(e) => {
                debug!(error = %e, "query not embeddable, using heuristic ranking");
                return None;
            }
        };

        let mut scored: Vec<ScoredMemory> = candidates
            .iter()
            .filter_map(|memory| {
                let embedding = self.valid_embedding(memory)?;
                let similarity = cosine_similarity(&query_embedding, embedding);
                (similarity > 0.0).then(|| ScoredMemory {
                    memory: (*memory).clone(),
                    score: similarity,
                })
            })
            .collect();

        if scored.len() < k {
            debug!(
                positive = scored.len(),
                k, "vector search underfilled, using heuristic ranking"
            );
            return None;
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        for s in &mut scored {
            s.memory.record_access(now);
        }
        Some(scored)
    }

    fn heuristic_rank(
        &self,
        query: &str,
        candidates: &[&Memory],
        k: usize,
        now: DateTime<Utc>,
    ) -> Vec<ScoredMemory> {
        let query_topics = detect_topics(query);
        let query_emotion = detect_emotion(query);

        let mut scored: Vec<ScoredMemory> = candidates
            .iter()
            .map(|memory| ScoredMemory {
                score: self.heuristic_score(memory, &query_topics, query_emotion, now),
                memory: (*memory).clone(),
            })
            .collect();

        // Stable: equal scores keep store order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    /// Blended heuristic score of one memory.
    ///
    /// `base = topic + emotion + importance`, then
    /// `w.base*base + w.recency*recency + w.importance*importance + w.access*access_count`.
    /// Importance therefore counts twice.
    pub fn heuristic_score(
        &self,
        memory: &Memory,
        query_topics: &BTreeSet<Topic>,
        query_emotion: Emotion,
        now: DateTime<Utc>,
    ) -> f64 {
        let s = &self.settings;
        let memory_topics = detect_topics(&memory.content);
        let shared = memory_topics.intersection(query_topics).count();
        let topic_score = shared as f64 / memory_topics.len().max(1) as f64 * s.topic_scale;

        let emotion_score = if detect_emotion(&memory.content) == query_emotion {
            s.emotion_bonus
        } else {
            0.0
        };

        let importance = f64::from(memory.importance);
        let base = topic_score + emotion_score + importance;

        // Future-dated memories count as brand new.
        let age = memory.age_days(now).max(0.0);
        let recency = (s.recency_window_days - age.min(s.recency_window_days)).max(0.0);

        s.weights.base * base
            + s.weights.recency * recency
            + s.weights.importance * importance
            + s.weights.access * f64::from(memory.access_count)
    }
}

fn dedup_by_id(memories: &[Memory]) -> Vec<&Memory> {
    let mut seen = HashSet::new();
    memories
        .iter()
        .filter(|m| seen.insert(m.id.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;
    use chrono::Duration;
    use haven_test_utils::MockEmbedder;
    use proptest::prelude::*;

    fn engine_with(mock: Arc<MockEmbedder>, dims: usize) -> RelevanceEngine {
        let embedder = Arc::new(Embedder::new(mock, dims, 18_000));
        RelevanceEngine::new(embedder, RelevanceSettings::default())
    }

    fn memory(content: &str, days_ago: i64, now: DateTime<Utc>) -> Memory {
        Memory::new(content, MemoryType::PersonalDetail, 5).with_date(now - Duration::days(days_ago))
    }

    fn embedded(content: &str, v: Vec<f32>, now: DateTime<Utc>) -> Memory {
        memory(content, 1, now).with_embedding(v)
    }

    #[tokio::test]
    async fn empty_collection_returns_empty_without_provider_call() {
        let mock = Arc::new(MockEmbedder::new(3));
        let engine = engine_with(mock.clone(), 3);
        let result = engine.retrieve("anything", &[], 5).await;
        assert!(result.memories.is_empty());
        assert_eq!(result.path, RetrievalPath::Empty);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_k_returns_empty() {
        let now = Utc::now();
        let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
        let result = engine.retrieve("x", &[memory("a", 0, now)], 0).await;
        assert!(result.memories.is_empty());
    }

    #[tokio::test]
    async fn recency_orders_equal_memories_without_embeddings() {
        let now = Utc::now();
        let memories = vec![
            memory("note about gardening", 30, now),
            memory("note about gardening", 5, now),
            memory("note about gardening", 0, now),
        ];
        let mock = Arc::new(MockEmbedder::new(3));
        let engine = engine_with(mock.clone(), 3);

        let result = engine.retrieve_at("zebra crossing", &memories, 3, now).await;
        assert_eq!(result.path, RetrievalPath::Heuristic);
        let ids = result.ids();
        assert_eq!(ids, vec![memories[2].id.clone(), memories[1].id.clone(), memories[0].id.clone()]);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn low_embedding_coverage_skips_provider() {
        let now = Utc::now();
        // 7 of 10 valid: 0.7 < 0.8.
        let memories: Vec<Memory> = (0..10)
            .map(|i| {
                let m = memory(&format!("memory {i}"), i, now);
                if i < 7 { m.with_embedding(vec![1.0, 0.0, 0.0]) } else { m }
            })
            .collect();
        let mock = Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let engine = engine_with(mock.clone(), 3);

        let result = engine.retrieve_at("memory", &memories, 3, now).await;
        assert_eq!(result.path, RetrievalPath::Heuristic);
        assert_eq!(mock.call_count(), 0);
    }

    fn vector_fixture(now: DateTime<Utc>) -> Vec<Memory> {
        vec![
            embedded("b", vec![0.5, 0.5, 0.0], now),
            embedded("a", vec![1.0, 0.0, 0.0], now),
            embedded("c", vec![0.0, 1.0, 0.0], now),
            embedded("d", vec![-1.0, 0.0, 0.0], now),
            embedded("e", vec![0.9, 0.1, 0.0], now),
        ]
    }

    #[tokio::test]
    async fn vector_path_ranks_by_cosine_and_bumps_access() {
        let now = Utc::now();
        let memories = vector_fixture(now);
        let mock = Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0]));
        let engine = engine_with(mock.clone(), 3);

        let result = engine.retrieve_at("query", &memories, 2, now).await;
        assert_eq!(result.path, RetrievalPath::Vector);
        assert!(result.updates_access());
        let contents: Vec<&str> = result.memories.iter().map(|s| s.memory.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "e"]);
        assert!(result.memories.iter().all(|s| s.memory.access_count == 1));
        assert!(result.memories.iter().all(|s| s.memory.last_accessed == Some(now)));
        // Input is untouched.
        assert!(memories.iter().all(|m| m.access_count == 0));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn non_positive_similarity_is_never_returned_on_vector_path() {
        let now = Utc::now();
        let memories = vector_fixture(now);
        let engine = engine_with(Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0])), 3);
        let result = engine.retrieve_at("query", &memories, 3, now).await;
        assert_eq!(result.path, RetrievalPath::Vector);
        assert!(result.memories.iter().all(|s| s.score > 0.0));
    }

    #[tokio::test]
    async fn underfilled_vector_search_falls_back_to_heuristic() {
        let now = Utc::now();
        let memories = vector_fixture(now);
        let engine = engine_with(Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0])), 3);

        // Only three memories have positive similarity.
        let result = engine.retrieve_at("query", &memories, 4, now).await;
        assert_eq!(result.path, RetrievalPath::Heuristic);
        assert_eq!(result.memories.len(), 4);
        assert!(result.memories.iter().all(|s| s.memory.access_count == 0));
    }

    #[tokio::test]
    async fn invalid_embeddings_are_excluded_from_vector_path() {
        let now = Utc::now();
        let mut memories = vector_fixture(now);
        memories.push(embedded("broken", vec![1.0, 0.0], now));
        let engine = engine_with(Arc::new(MockEmbedder::fixed(vec![1.0, 0.0, 0.0])), 3);
        let result = engine.retrieve_at("query", &memories, 3, now).await;
        assert_eq!(result.path, RetrievalPath::Vector);
        assert!(result.memories.iter().all(|s| s.memory.content != "broken"));
    }

    #[tokio::test]
    async fn exact_content_match_ranks_first_with_honest_embedder() {
        let now = Utc::now();
        let mock = Arc::new(MockEmbedder::new(1536));
        let texts = [
            "I love hiking in the mountains with my dog",
            "My sister lives in Chicago",
            "I feel anxious before family dinners",
            "Walking helps when cravings hit",
        ];
        let memories: Vec<Memory> = texts
            .iter()
            .map(|t| embedded(t, mock.vector_for(t), now))
            .collect();
        let engine = engine_with(mock, 1536);

        let result = engine.retrieve_at(texts[2], &memories, 1, now).await;
        assert_eq!(result.path, RetrievalPath::Vector);
        assert_eq!(result.memories[0].memory.content, texts[2]);
        assert!((result.memories[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn failing_provider_still_returns_k_results() {
        let now = Utc::now();
        let memories: Vec<Memory> = (0..6)
            .map(|i| embedded(&format!("m{i}"), vec![0.2 * i as f32 + 0.1, 0.3, 0.4], now))
            .collect();
        let engine = engine_with(Arc::new(MockEmbedder::failing(3)), 3);
        let result = engine.retrieve_at("query", &memories, 3, now).await;
        assert_eq!(result.memories.len(), 3);
    }

    #[tokio::test]
    async fn topic_overlap_outranks_unrelated_memory() {
        let now = Utc::now();
        let memories = vec![
            memory("I enjoy gardening on weekends", 0, now),
            memory("Cravings show up after every party", 0, now),
        ];
        let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
        let result = engine
            .retrieve_at("I had a craving at the party", &memories, 1, now)
            .await;
        assert_eq!(result.memories[0].memory.content, "Cravings show up after every party");
    }

    #[tokio::test]
    async fn access_count_breaks_heuristic_ties() {
        let now = Utc::now();
        let plain = memory("note", 2, now);
        let mut popular = memory("note", 2, now);
        popular.access_count = 4;
        let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
        let result = engine.retrieve_at("zzz", &[plain, popular.clone()], 1, now).await;
        assert_eq!(result.memories[0].memory.id, popular.id);
    }

    #[tokio::test]
    async fn duplicate_ids_are_returned_once() {
        let now = Utc::now();
        let m = memory("same", 0, now);
        let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
        let result = engine.retrieve_at("x", &[m.clone(), m.clone(), m], 5, now).await;
        assert_eq!(result.memories.len(), 1);
    }

    #[test]
    fn heuristic_score_matches_formula() {
        let now = Utc::now();
        let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
        // No topics, neutral emotion on both sides, importance 5, 4 days old.
        let m = memory("zebra", 4, now);
        let score = engine.heuristic_score(&m, &BTreeSet::new(), Emotion::Neutral, now);
        let base = 0.0 + 5.0 + 5.0;
        let expected = 0.4 * base + 0.4 * 6.0 + 0.4 * 5.0;
        assert!((score - expected).abs() < 1e-6, "{score} != {expected}");
    }

    #[test]
    fn future_dated_memory_gets_full_recency() {
        let now = Utc::now();
        let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
        let future = memory("zebra", -3, now);
        let today = memory("zebra", 0, now);
        let a = engine.heuristic_score(&future, &BTreeSet::new(), Emotion::Neutral, now);
        let b = engine.heuristic_score(&today, &BTreeSet::new(), Emotion::Neutral, now);
        assert!((a - b).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn heuristic_returns_min_k_n_distinct_known_ids(n in 0usize..20, k in 0usize..25) {
            let now = Utc::now();
            let memories: Vec<Memory> = (0..n)
                .map(|i| memory(&format!("entry {i}"), i as i64, now))
                .collect();
            let engine = engine_with(Arc::new(MockEmbedder::new(3)), 3);
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = rt.block_on(engine.retrieve_at("query", &memories, k, now));

            prop_assert_eq!(result.memories.len(), k.min(n));
            let ids: HashSet<String> = result.ids().into_iter().collect();
            prop_assert_eq!(ids.len(), result.memories.len());
            prop_assert!(ids.iter().all(|id| memories.iter().any(|m| &m.id == id)));
        }
    }
}
