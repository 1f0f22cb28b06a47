// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory ingestion: turns domain events into persisted memories.
//!
//! Synthesis is pure ([`synthesize`]); [`MemoryExtractor`] adds embeddings
//! (with fallback) and persists. Embedding trouble never drops a record.

use std::fmt;
use std::sync::{Arc, LazyLock};

use haven_core::error::HavenError;
use haven_core::types::UserId;
use regex::Regex;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, warn};

use crate::classifier::detect_topics;
use crate::embedder::Embedder;
use crate::store::MemoryStore;
use crate::types::{Memory, MemoryType};

const PATTERN_IMPORTANCE: i64 = 8;
const JOURNAL_EXCERPT_CHARS: usize = 280;

/// Self-referential statements, tried in order. Each match is one memory.
static DETAIL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bI\s+feel\b[^.!?\n]+",
        r"(?i)\bI\s+want\b[^.!?\n]+",
        r"(?i)\bI\s+need\b[^.!?\n]+",
        r"(?i)\b(?:I\s+am|I'm|I’m)\s+[^.!?\n]+",
        r"(?i)\bmy\s+(?:family|wife|husband|partner|kids?|children|son|daughter|mom|mother|dad|father|brother|sister|friends?|sponsor|job|boss)\b[^.!?\n]*",
        r"(?i)\bI\s+(?:really\s+)?(?:like|love|enjoy|hate)\b[^.!?\n]+",
        r"(?i)\bI\s+(?:used\s+to|started|quit|stopped)\b[^.!?\n]+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Craving intensity reported at check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UrgeLevel {
    None,
    Mild,
    Moderate,
    Strong,
    Overwhelming,
}

impl UrgeLevel {
    /// The top two severities.
    pub fn is_severe(&self) -> bool {
        matches!(self, UrgeLevel::Strong | UrgeLevel::Overwhelming)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgeLevel::None => "none",
            UrgeLevel::Mild => "mild",
            UrgeLevel::Moderate => "moderate",
            UrgeLevel::Strong => "strong",
            UrgeLevel::Overwhelming => "overwhelming",
        }
    }
}

impl fmt::Display for UrgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UrgeLevel {
    type Err = HavenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(UrgeLevel::None),
            "mild" => Ok(UrgeLevel::Mild),
            "moderate" => Ok(UrgeLevel::Moderate),
            "strong" => Ok(UrgeLevel::Strong),
            "overwhelming" => Ok(UrgeLevel::Overwhelming),
            other => Err(HavenError::Validation {
                message: format!("unknown urge level `{other}`"),
            }),
        }
    }
}

/// Something the user did that may be worth remembering.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    ChatMessage {
        text: String,
    },
    /// An insight span lifted from an assistant reply.
    AssistantInsight {
        text: String,
    },
    CheckIn {
        mood: String,
        urge: UrgeLevel,
        note: Option<String>,
    },
    JournalEntry {
        text: String,
    },
    TaskCreated {
        title: String,
    },
    TaskCompleted {
        title: String,
    },
    TriggerLogged {
        trigger: String,
        coping_strategy: Option<String>,
        coping_succeeded: bool,
    },
    SetbackRecorded {
        description: String,
    },
    StreakMilestone {
        days: u32,
    },
}

/// One `personal_detail` memory per pattern match in `text`.
pub fn extract_personal_details(text: &str) -> Vec<Memory> {
    DETAIL_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.find_iter(text))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            Memory::new(s, MemoryType::PersonalDetail, PATTERN_IMPORTANCE)
                .with_tags(topic_tags(s))
                .with_tags(["extracted"])
        })
        .collect()
}

fn topic_tags(text: &str) -> Vec<String> {
    detect_topics(text)
        .into_iter()
        .map(|t| t.as_str().to_string())
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Memories implied by `event`, without embeddings.
pub fn synthesize(event: &DomainEvent) -> Vec<Memory> {
    match event {
        DomainEvent::ChatMessage { text } => extract_personal_details(text),

        DomainEvent::AssistantInsight { text } => {
            let text = text.trim();
            if text.is_empty() {
                return Vec::new();
            }
            vec![Memory::new(text, MemoryType::Breakthrough, 8).with_tags(["insight", "ai"])]
        }

        DomainEvent::CheckIn { mood, urge, note } => {
            let mut content = format!("Check-in: feeling {}, urge level {urge}", mood.trim());
            if let Some(note) = note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                content.push_str(&format!(". Note: {note}"));
            }
            let importance = if urge.is_severe() { 9 } else { 7 };
            let mut memories = vec![
                Memory::new(content, MemoryType::PersonalDetail, importance)
                    .with_tags(["check_in".to_string(), format!("urge_{urge}")]),
            ];
            if let Some(note) = note {
                memories.extend(extract_personal_details(note));
            }
            memories
        }

        DomainEvent::JournalEntry { text } => {
            if text.trim().is_empty() {
                return Vec::new();
            }
            let mut memories = vec![
                Memory::new(
                    format!("Journal: {}", excerpt(text, JOURNAL_EXCERPT_CHARS)),
                    MemoryType::PersonalDetail,
                    6,
                )
                .with_tags(["journal"])
                .with_tags(topic_tags(text)),
            ];
            memories.extend(extract_personal_details(text));
            memories
        }

        DomainEvent::TaskCreated { title } => {
            vec![Memory::new(format!("New goal: {}", title.trim()), MemoryType::Goal, 6).with_tags(["task"])]
        }

        DomainEvent::TaskCompleted { title } => vec![
            Memory::new(format!("Completed: {}", title.trim()), MemoryType::Breakthrough, 7)
                .with_tags(["task", "completed"]),
        ],

        DomainEvent::TriggerLogged {
            trigger,
            coping_strategy,
            coping_succeeded,
        } => {
            let trigger = trigger.trim();
            let mut memories =
                vec![Memory::new(format!("Trigger: {trigger}"), MemoryType::Trigger, 7).with_tags(["trigger"])];
            if let Some(strategy) = coping_strategy
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *coping_succeeded)
            {
                memories.push(
                    Memory::new(
                        format!("{strategy} helped when facing {trigger}"),
                        MemoryType::CopingStrategy,
                        8,
                    )
                    .with_tags(["coping"]),
                );
            }
            memories
        }

        DomainEvent::SetbackRecorded { description } => vec![
            Memory::new(format!("Setback: {}", description.trim()), MemoryType::Setback, 9)
                .with_tags(["setback"]),
        ],

        DomainEvent::StreakMilestone { days } => {
            let importance = if *days >= 365 { 10 } else { 8 };
            vec![
                Memory::new(format!("Reached a {days}-day streak"), MemoryType::Breakthrough, importance)
                    .with_tags(["streak", "milestone"]),
            ]
        }
    }
}

/// Embeds and persists memories synthesized from domain events.
pub struct MemoryExtractor {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<Embedder>,
    enabled: bool,
    tracker: TaskTracker,
}

impl MemoryExtractor {
    pub fn new(store: Arc<dyn MemoryStore>, embedder: Arc<Embedder>) -> Self {
        Self {
            store,
            embedder,
            enabled: true,
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Synthesizes, embeds and persists the memories for one event.
    pub async fn ingest(&self, user: &UserId, event: &DomainEvent) -> Result<Vec<Memory>, HavenError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        let mut memories = synthesize(event);
        if memories.is_empty() {
            return Ok(memories);
        }
        for memory in &mut memories {
            self.attach_embedding(memory).await;
        }
        self.store.put_memories(user, &memories).await?;
        debug!(user = %user, count = memories.len(), "ingested memories");
        Ok(memories)
    }

    /// Persists a single caller-built memory.
    pub async fn remember(&self, user: &UserId, mut memory: Memory) -> Result<Memory, HavenError> {
        if memory.content.trim().is_empty() {
            return Err(HavenError::EmptyInput);
        }
        self.attach_embedding(&mut memory).await;
        self.store.upsert_memory(user, &memory).await?;
        Ok(memory)
    }

    /// Runs [`MemoryExtractor::ingest`] in the background. Failures are logged.
    pub fn spawn_ingest(self: &Arc<Self>, user: UserId, event: DomainEvent) {
        let this = Arc::clone(self);
        self.tracker.spawn(
            async move {
                if let Err(e) = this.ingest(&user, &event).await {
                    warn!(user = %user, error = %e, "memory ingestion failed");
                }
            }
            .in_current_span(),
        );
    }

    /// Waits for every spawned ingestion to finish.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    async fn attach_embedding(&self, memory: &mut Memory) {
        if memory
            .embedding
            .as_deref()
            .is_some_and(|v| self.embedder.is_valid(v))
        {
            return;
        }
        memory.embedding = match self.embedder.embed_or_fallback(&memory.content).await {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(memory_id = %memory.id, error = %e, "memory saved without embedding");
                None
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::fallback_embedding;
    use crate::store::{InMemoryMemoryStore, UnavailableStore};
    use haven_test_utils::MockEmbedder;

    fn contents(memories: &[Memory]) -> Vec<&str> {
        memories.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn extracts_each_self_referential_statement() {
        let memories = extract_personal_details(
            "I feel nervous about Friday. My partner is visiting! I love cooking for her.",
        );
        assert_eq!(
            contents(&memories),
            vec!["I feel nervous about Friday", "My partner is visiting", "I love cooking for her"]
        );
        assert!(memories
            .iter()
            .all(|m| m.memory_type == MemoryType::PersonalDetail && m.importance == 8));
        assert!(memories[1].tags.contains("relationships"));
    }

    #[test]
    fn overlapping_patterns_yield_separate_memories() {
        let memories = extract_personal_details("I feel like I want to quit");
        assert_eq!(contents(&memories), vec!["I feel like I want to quit", "I want to quit"]);
    }

    #[test]
    fn plain_text_yields_nothing() {
        assert!(extract_personal_details("The weather was nice.").is_empty());
    }

    #[test]
    fn check_in_importance_follows_urge() {
        let mild = synthesize(&DomainEvent::CheckIn {
            mood: "tired".into(),
            urge: UrgeLevel::Mild,
            note: None,
        });
        let strong = synthesize(&DomainEvent::CheckIn {
            mood: "tense".into(),
            urge: UrgeLevel::Strong,
            note: None,
        });
        let overwhelming = synthesize(&DomainEvent::CheckIn {
            mood: "awful".into(),
            urge: UrgeLevel::Overwhelming,
            note: None,
        });
        assert_eq!(mild.len(), 1);
        assert_eq!(mild[0].importance, 7);
        assert_eq!(strong[0].importance, 9);
        assert_eq!(overwhelming[0].importance, 9);
        assert!(mild[0].content.contains("urge level mild"));
        assert!(strong[0].tags.contains("urge_strong"));
    }

    #[test]
    fn check_in_note_is_mined_for_details() {
        let memories = synthesize(&DomainEvent::CheckIn {
            mood: "okay".into(),
            urge: UrgeLevel::None,
            note: Some("I need more sleep".into()),
        });
        assert_eq!(memories.len(), 2);
        assert!(memories[0].content.ends_with("Note: I need more sleep"));
        assert_eq!(memories[1].content, "I need more sleep");
    }

    #[test]
    fn trigger_adds_coping_only_on_success() {
        let worked = synthesize(&DomainEvent::TriggerLogged {
            trigger: "payday".into(),
            coping_strategy: Some("Called my sponsor".into()),
            coping_succeeded: true,
        });
        assert_eq!(worked.len(), 2);
        assert_eq!(worked[0].memory_type, MemoryType::Trigger);
        assert_eq!(worked[1].memory_type, MemoryType::CopingStrategy);
        assert_eq!(worked[1].importance, 8);

        let failed = synthesize(&DomainEvent::TriggerLogged {
            trigger: "payday".into(),
            coping_strategy: Some("Called my sponsor".into()),
            coping_succeeded: false,
        });
        assert_eq!(failed.len(), 1);
    }

    #[test]
    fn task_and_milestone_types() {
        let done = synthesize(&DomainEvent::TaskCompleted {
            title: "Go to a meeting".into(),
        });
        assert_eq!(done[0].memory_type, MemoryType::Breakthrough);
        assert_eq!(done[0].importance, 7);

        let created = synthesize(&DomainEvent::TaskCreated {
            title: "Run a 5k".into(),
        });
        assert_eq!(created[0].memory_type, MemoryType::Goal);

        let year = synthesize(&DomainEvent::StreakMilestone { days: 365 });
        let month = synthesize(&DomainEvent::StreakMilestone { days: 30 });
        assert_eq!(year[0].importance, 10);
        assert_eq!(month[0].importance, 8);

        let setback = synthesize(&DomainEvent::SetbackRecorded {
            description: "Drank at the wedding".into(),
        });
        assert_eq!(setback[0].memory_type, MemoryType::Setback);
        assert_eq!(setback[0].importance, 9);
    }

    #[test]
    fn assistant_insight_is_tagged_breakthrough() {
        let memories = synthesize(&DomainEvent::AssistantInsight {
            text: " Mornings are your strongest time ".into(),
        });
        assert_eq!(memories[0].content, "Mornings are your strongest time");
        assert_eq!(memories[0].memory_type, MemoryType::Breakthrough);
        assert!(memories[0].tags.contains("insight") && memories[0].tags.contains("ai"));
    }

    #[test]
    fn urge_level_parses_case_insensitively() {
        assert_eq!("Strong".parse::<UrgeLevel>().unwrap(), UrgeLevel::Strong);
        assert!("extreme".parse::<UrgeLevel>().is_err());
    }

    #[tokio::test]
    async fn ingest_embeds_and_persists() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let mock = Arc::new(MockEmbedder::new(16));
        let embedder = Arc::new(Embedder::new(mock.clone(), 16, 18_000));
        let extractor = MemoryExtractor::new(store.clone(), embedder);
        let user = UserId::from("u1");

        let saved = extractor
            .ingest(&user, &DomainEvent::ChatMessage {
                text: "I want to sleep better".into(),
            })
            .await
            .unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].embedding.as_ref().map(Vec::len), Some(16));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(store.get_memories(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_still_saves_with_fallback() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let embedder = Arc::new(Embedder::new(Arc::new(MockEmbedder::failing(8)), 8, 18_000));
        let extractor = MemoryExtractor::new(store.clone(), embedder);
        let user = UserId::from("u1");

        extractor
            .ingest(&user, &DomainEvent::SetbackRecorded {
                description: "rough weekend".into(),
            })
            .await
            .unwrap();
        let stored = store.get_memories(&user).await.unwrap();
        assert_eq!(
            stored[0].embedding,
            Some(fallback_embedding("Setback: rough weekend", 8))
        );
    }

    #[tokio::test]
    async fn existing_valid_embedding_is_kept() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let mock = Arc::new(MockEmbedder::new(2));
        let extractor = MemoryExtractor::new(store, Arc::new(Embedder::new(mock.clone(), 2, 100)));
        let memory = Memory::new("pre-embedded", MemoryType::Goal, 5).with_embedding(vec![0.5, 0.5]);
        let saved = extractor.remember(&UserId::from("u1"), memory).await.unwrap();
        assert_eq!(saved.embedding, Some(vec![0.5, 0.5]));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn disabled_ingestion_is_a_no_op() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let extractor = MemoryExtractor::new(store.clone(), Arc::new(Embedder::fallback_only(4, 100)))
            .with_enabled(false);
        let user = UserId::from("u1");
        let saved = extractor
            .ingest(&user, &DomainEvent::StreakMilestone { days: 7 })
            .await
            .unwrap();
        assert!(saved.is_empty());
        assert!(store.get_memories(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn spawned_ingestion_logs_store_failure() {
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::new(UnavailableStore),
            Arc::new(Embedder::fallback_only(4, 100)),
        ));
        extractor.spawn_ingest(
            UserId::from("u1"),
            DomainEvent::TaskCreated {
                title: "Call mom".into(),
            },
        );
        extractor.flush().await;
        assert!(logs_contain("memory ingestion failed"));
    }

    #[tokio::test]
    async fn concurrent_spawned_ingestion_loses_nothing() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let extractor = Arc::new(MemoryExtractor::new(
            store.clone(),
            Arc::new(Embedder::fallback_only(4, 100)),
        ));
        let user = UserId::from("u1");
        for days in 1..=10 {
            extractor.spawn_ingest(user.clone(), DomainEvent::StreakMilestone { days });
        }
        extractor.flush().await;
        assert_eq!(store.get_memories(&user).await.unwrap().len(), 10);
    }
}
