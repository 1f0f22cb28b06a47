// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the relevance engine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest importance a memory may carry.
pub const MIN_IMPORTANCE: u8 = 1;
/// Highest importance a memory may carry.
pub const MAX_IMPORTANCE: u8 = 10;

/// A single durable fact about the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier, stable for the life of the record.
    pub id: String,
    /// When the underlying event happened.
    pub date: DateTime<Utc>,
    /// Human-readable fact text.
    pub content: String,
    /// Category of the fact.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Significance on a 1-10 scale.
    pub importance: u8,
    /// Free-form labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Times this memory was surfaced by vector retrieval.
    #[serde(default)]
    pub access_count: u32,
    /// Most recent vector retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Semantic vector. Absent or invalid vectors exclude the memory from
    /// the vector path only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Memory {
    /// Creates a memory dated now with a fresh identifier.
    pub fn new(content: impl Into<String>, memory_type: MemoryType, importance: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: Utc::now(),
            content: content.into(),
            memory_type,
            importance: clamp_importance(importance),
            tags: BTreeSet::new(),
            access_count: 0,
            last_accessed: None,
            embedding: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Fractional age in days relative to `now`. Negative for future dates.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.date).num_milliseconds() as f64 / 86_400_000.0
    }

    /// Bumps the access statistics for one vector retrieval.
    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = Some(at);
    }
}

/// Clamps an arbitrary importance into the 1-10 range.
pub fn clamp_importance(importance: i64) -> u8 {
    importance.clamp(i64::from(MIN_IMPORTANCE), i64::from(MAX_IMPORTANCE)) as u8
}

/// Category of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    PersonalDetail,
    Preference,
    Breakthrough,
    Trigger,
    CopingStrategy,
    Goal,
    Setback,
    ConversationSummary,
}

impl MemoryType {
    pub const ALL: [MemoryType; 8] = [
        MemoryType::PersonalDetail,
        MemoryType::Preference,
        MemoryType::Breakthrough,
        MemoryType::Trigger,
        MemoryType::CopingStrategy,
        MemoryType::Goal,
        MemoryType::Setback,
        MemoryType::ConversationSummary,
    ];

    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::PersonalDetail => "personal_detail",
            MemoryType::Preference => "preference",
            MemoryType::Breakthrough => "breakthrough",
            MemoryType::Trigger => "trigger",
            MemoryType::CopingStrategy => "coping_strategy",
            MemoryType::Goal => "goal",
            MemoryType::Setback => "setback",
            MemoryType::ConversationSummary => "conversation_summary",
        }
    }

    /// Parse from SQLite string. Unknown categories yield `None`.
    pub fn from_str_value(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Upper-case label used in the context block, e.g. `COPING STRATEGY`.
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

/// A short observation the assistant flagged in a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub date: DateTime<Utc>,
    pub content: String,
    /// The user's own annotation, if they added one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,
    /// Where the insight came from, e.g. `assistant`.
    pub source: String,
}

impl Insight {
    pub fn from_assistant(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date: Utc::now(),
            content: content.into(),
            user_note: None,
            source: "assistant".to_string(),
        }
    }
}

/// Who produced a conversation summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    /// Built locally from keyword heuristics.
    ClientGenerated,
    /// Written by the language model.
    AiGenerated,
}

impl SummaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::ClientGenerated => "client_generated",
            SummaryType::AiGenerated => "ai_generated",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "ai_generated" => SummaryType::AiGenerated,
            _ => SummaryType::ClientGenerated,
        }
    }
}

/// Rolling digest of a window of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub date: DateTime<Utc>,
    pub summary: String,
    pub message_ids: Vec<String>,
    pub topics: BTreeSet<String>,
    pub emotional_state: String,
    pub key_insights: Vec<String>,
    pub summary_type: SummaryType,
}

/// A memory with the score that ranked it.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    /// Cosine similarity on the vector path, blended heuristic score otherwise.
    pub score: f64,
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
///
/// Returns `None` when the blob length is not a multiple of four.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero norm, so
/// the result is always finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}
