// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Haven companion.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier scoping every per-user collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    Completion,
    Storage,
}

// --- Embedding types ---

/// Input for an embedding adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingInput {
    /// Texts to embed, one vector per entry.
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    /// One vector per input text, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Dimension the adapter claims to produce.
    pub dimensions: usize,
}

// --- Completion types ---

/// Author of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single turn in the conversation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
}

/// A fully composed prompt handed to the completion collaborator.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Static instructions plus the formatted memory context.
    pub system_prompt: String,
    /// Recent message window followed by the user's new message.
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

/// A single text completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}
