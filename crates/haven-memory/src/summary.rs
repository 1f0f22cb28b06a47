// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword-built conversation summaries, produced every N turns.

use std::collections::BTreeSet;

use chrono::Utc;
use haven_core::types::{ChatMessage, ChatRole};

use crate::classifier::{detect_emotion, detect_topics};
use crate::extractor::extract_personal_details;
use crate::types::{ConversationSummary, SummaryType};

const MAX_KEY_INSIGHTS: usize = 5;

/// Whether a summary is due after `turns` user turns.
///
/// An interval of zero disables summaries.
pub fn should_summarize(turns: usize, interval: usize) -> bool {
    interval > 0 && turns > 0 && turns % interval == 0
}

/// Summarizes the user side of `messages`.
///
/// Returns `None` when the window holds no user text.
pub fn build_client_summary(messages: &[ChatMessage]) -> Option<ConversationSummary> {
    let user_text: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if user_text.is_empty() {
        return None;
    }
    let joined = user_text.join("\n");

    let topics: BTreeSet<String> = detect_topics(&joined)
        .into_iter()
        .map(|t| t.as_str().to_string())
        .collect();
    let emotion = detect_emotion(&joined);

    let mut key_insights: Vec<String> = Vec::new();
    for detail in user_text.iter().flat_map(|t| extract_personal_details(t)) {
        if key_insights.len() == MAX_KEY_INSIGHTS {
            break;
        }
        if !key_insights.contains(&detail.content) {
            key_insights.push(detail.content);
        }
    }

    let mut summary = if topics.is_empty() {
        format!("General conversation over {} messages", user_text.len())
    } else {
        let listed: Vec<&str> = topics.iter().map(String::as_str).collect();
        format!("Discussed {}", listed.join(", "))
    };
    summary.push_str(&format!("; user seemed {emotion}."));

    Some(ConversationSummary {
        id: uuid::Uuid::new_v4().to_string(),
        date: Utc::now(),
        summary,
        message_ids: messages.iter().map(|m| m.id.clone()).collect(),
        topics,
        emotional_state: emotion.as_str().to_string(),
        key_insights,
        summary_type: SummaryType::ClientGenerated,
    })
}
