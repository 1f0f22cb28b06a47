// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One chat turn: ingest, recall, prompt, complete, forward insights.

use std::sync::Arc;

use haven_config::model::HavenConfig;
use haven_core::error::HavenError;
use haven_core::traits::CompletionAdapter;
use haven_core::types::{ChatMessage, ChatRole, CompletionRequest, UserId};
use tracing::{debug, info, warn};

use crate::extractor::{DomainEvent, MemoryExtractor};
use crate::insight::split_insights;
use crate::provider::MemoryProvider;
use crate::summary::{build_client_summary, should_summarize};
use crate::types::{ConversationSummary, Insight};

/// Knobs for composing a turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_prompt: String,
    /// Size of the recent-message window sent with the prompt.
    pub recent_messages: usize,
    pub max_tokens: u32,
    /// Memories retrieved per turn.
    pub max_results: usize,
    /// User turns between conversation summaries; zero disables them.
    pub summary_interval: usize,
}

impl From<&HavenConfig> for TurnSettings {
    fn from(config: &HavenConfig) -> Self {
        Self {
            system_prompt: config.agent.system_prompt.clone(),
            recent_messages: config.context.recent_messages,
            max_tokens: config.context.max_tokens,
            max_results: config.retrieval.max_results,
            summary_interval: config.ingestion.summary_interval,
        }
    }
}

/// What a turn produced.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// The reply with insight spans removed.
    pub text: String,
    /// Insights saved from this reply.
    pub insights: Vec<Insight>,
    /// Whether any memory context went into the prompt.
    pub used_context: bool,
    pub summary: Option<ConversationSummary>,
}

/// Builds the completion request for a turn.
pub fn compose_request(
    settings: &TurnSettings,
    context: &str,
    history: &[ChatMessage],
    message: ChatMessage,
) -> CompletionRequest {
    let mut system_prompt = settings.system_prompt.trim_end().to_string();
    if !context.is_empty() {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(context);
    }

    let start = history.len().saturating_sub(settings.recent_messages);
    let mut messages = history[start..].to_vec();
    messages.push(message);

    CompletionRequest {
        system_prompt,
        messages,
        max_tokens: settings.max_tokens,
    }
}

/// Drives chat turns against the memory engine and a completion adapter.
pub struct Companion {
    provider: Arc<MemoryProvider>,
    extractor: Arc<MemoryExtractor>,
    completion: Arc<dyn CompletionAdapter>,
    settings: TurnSettings,
}

impl Companion {
    pub fn new(
        provider: Arc<MemoryProvider>,
        extractor: Arc<MemoryExtractor>,
        completion: Arc<dyn CompletionAdapter>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            provider,
            extractor,
            completion,
            settings,
        }
    }

    /// Runs one turn. `history` is the conversation so far, oldest first.
    ///
    /// Only a completion failure is returned; memory trouble degrades to a
    /// context-free prompt.
    pub async fn turn(
        &self,
        user: &UserId,
        history: &[ChatMessage],
        text: &str,
    ) -> Result<TurnReply, HavenError> {
        if text.trim().is_empty() {
            return Err(HavenError::EmptyInput);
        }

        self.extractor.spawn_ingest(
            user.clone(),
            DomainEvent::ChatMessage {
                text: text.to_string(),
            },
        );

        let context = self
            .provider
            .provide_context(user, text, self.settings.max_results)
            .await;
        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: ChatRole::User,
            content: text.to_string(),
        };
        let request = compose_request(&self.settings, &context, history, message.clone());
        debug!(
            user = %user,
            context_chars = context.len(),
            window = request.messages.len(),
            "composed prompt"
        );

        let response = self.completion.complete(request).await?;
        let parsed = split_insights(&response.content);

        let mut insights = Vec::with_capacity(parsed.insights.len());
        for content in parsed.insights {
            let insight = Insight::from_assistant(content.clone());
            if let Err(e) = self.provider.store().put_insight(user, &insight).await {
                warn!(user = %user, error = %e, "failed to save insight");
            }
            self.extractor
                .spawn_ingest(user.clone(), DomainEvent::AssistantInsight { text: content });
            insights.push(insight);
        }

        let reply = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: ChatRole::Assistant,
            content: parsed.visible.clone(),
        };
        let summary = self.maybe_summarize(user, history, [message, reply]).await;

        Ok(TurnReply {
            text: parsed.visible,
            insights,
            used_context: !context.is_empty(),
            summary,
        })
    }

    async fn maybe_summarize(
        &self,
        user: &UserId,
        history: &[ChatMessage],
        latest: [ChatMessage; 2],
    ) -> Option<ConversationSummary> {
        let interval = self.settings.summary_interval;
        let turns = history.iter().filter(|m| m.role == ChatRole::User).count() + 1;
        if !should_summarize(turns, interval) {
            return None;
        }

        let start = history.len().saturating_sub(interval * 2);
        let mut window = history[start..].to_vec();
        window.extend(latest);
        let summary = build_client_summary(&window)?;
        match self.provider.store().put_summary(user, &summary).await {
            Ok(()) => {
                info!(user = %user, turns, "saved conversation summary");
                Some(summary)
            }
            Err(e) => {
                warn!(user = %user, error = %e, "failed to save conversation summary");
                None
            }
        }
    }

    /// Waits for background ingestion spawned by earlier turns.
    pub async fn flush(&self) {
        self.extractor.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::formatter::CONTEXT_HEADER;
    use crate::retriever::{RelevanceEngine, RelevanceSettings};
    use crate::store::{InMemoryMemoryStore, MemoryStore, UnavailableStore};
    use crate::types::{Memory, MemoryType};
    use haven_test_utils::MockCompletion;

    fn settings() -> TurnSettings {
        TurnSettings {
            system_prompt: "You are a kind companion.".into(),
            recent_messages: 2,
            max_tokens: 256,
            max_results: 5,
            summary_interval: 2,
        }
    }

    fn companion(store: Arc<dyn MemoryStore>, completion: Arc<MockCompletion>) -> Companion {
        let embedder = Arc::new(Embedder::fallback_only(8, 1000));
        let engine = Arc::new(RelevanceEngine::new(embedder.clone(), RelevanceSettings::default()));
        Companion::new(
            Arc::new(MemoryProvider::new(store.clone(), engine)),
            Arc::new(MemoryExtractor::new(store, embedder)),
            completion,
            settings(),
        )
    }

    fn msg(role: ChatRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }

    #[test]
    fn compose_keeps_recent_window_and_appends_message() {
        let history = vec![
            msg(ChatRole::User, "one"),
            msg(ChatRole::Assistant, "two"),
            msg(ChatRole::User, "three"),
        ];
        let request = compose_request(&settings(), "", &history, msg(ChatRole::User, "four"));
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three", "four"]);
        assert_eq!(request.system_prompt, "You are a kind companion.");
        assert_eq!(request.max_tokens, 256);
    }

    #[test]
    fn compose_appends_context_to_system_prompt() {
        let request = compose_request(&settings(), "CTX", &[], msg(ChatRole::User, "hi"));
        assert_eq!(request.system_prompt, "You are a kind companion.\n\nCTX");
    }

    #[tokio::test]
    async fn turn_injects_memories_and_forwards_insight() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let user = UserId::from("u1");
        store
            .put_memories(&user, &[Memory::new("Payday is a trigger", MemoryType::Trigger, 7)])
            .await
            .unwrap();
        let completion = Arc::new(MockCompletion::scripted([
            "Let's plan for payday. <INSIGHT>Payday evenings need a plan</INSIGHT>",
        ]));
        let companion = companion(store.clone(), completion.clone());

        let reply = companion.turn(&user, &[], "payday is tomorrow").await.unwrap();
        companion.flush().await;

        assert_eq!(reply.text, "Let's plan for payday.");
        assert!(reply.used_context);
        assert_eq!(reply.insights.len(), 1);

        let request = &completion.requests()[0];
        assert!(request.system_prompt.contains(CONTEXT_HEADER));
        assert!(request.system_prompt.contains("Payday is a trigger"));

        let insights = store.get_insights(&user).await.unwrap();
        assert_eq!(insights[0].content, "Payday evenings need a plan");
        let memories = store.get_memories(&user).await.unwrap();
        assert!(memories
            .iter()
            .any(|m| m.memory_type == MemoryType::Breakthrough && m.content == "Payday evenings need a plan"));
    }

    #[tokio::test]
    async fn chat_message_is_ingested() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let user = UserId::from("u1");
        let companion = companion(store.clone(), Arc::new(MockCompletion::scripted(["ok"])));
        companion.turn(&user, &[], "I want to run a marathon").await.unwrap();
        companion.flush().await;
        let memories = store.get_memories(&user).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content, "I want to run a marathon");
    }

    #[tokio::test]
    async fn unavailable_store_still_completes_the_turn() {
        let completion = Arc::new(MockCompletion::scripted(["Hello there"]));
        let companion = companion(Arc::new(UnavailableStore), completion.clone());
        let reply = companion
            .turn(&UserId::from("u1"), &[], "hi")
            .await
            .unwrap();
        assert_eq!(reply.text, "Hello there");
        assert!(!reply.used_context);
        assert_eq!(completion.requests()[0].system_prompt, "You are a kind companion.");
    }

    #[tokio::test]
    async fn completion_failure_propagates() {
        let companion = companion(
            Arc::new(InMemoryMemoryStore::new()),
            Arc::new(MockCompletion::failing()),
        );
        let err = companion.turn(&UserId::from("u1"), &[], "hi").await.unwrap_err();
        assert!(matches!(err, HavenError::Completion { .. }));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let companion = companion(
            Arc::new(InMemoryMemoryStore::new()),
            Arc::new(MockCompletion::scripted(["unused"])),
        );
        let err = companion.turn(&UserId::from("u1"), &[], "   ").await.unwrap_err();
        assert!(matches!(err, HavenError::EmptyInput));
    }

    #[tokio::test]
    async fn summary_is_saved_on_interval() {
        let store = Arc::new(InMemoryMemoryStore::new());
        let user = UserId::from("u1");
        let companion = companion(store.clone(), Arc::new(MockCompletion::scripted(["noted", "noted"])));

        let first = companion.turn(&user, &[], "Stress at work again").await.unwrap();
        assert!(first.summary.is_none());

        let history = vec![msg(ChatRole::User, "Stress at work again"), msg(ChatRole::Assistant, "noted")];
        let second = companion.turn(&user, &history, "My sponsor helped").await.unwrap();
        let summary = second.summary.unwrap();
        assert_eq!(summary.message_ids.len(), 4);
        assert!(summary.topics.contains("recovery"));
        assert_eq!(store.get_summaries(&user).await.unwrap().len(), 1);
        companion.flush().await;
    }
}
