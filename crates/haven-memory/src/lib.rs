// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory relevance engine for the Haven companion.
//!
//! Stores timestamped personal-history records per user, embeds them, and
//! retrieves the ones most relevant to a new chat turn. Vector similarity is
//! used when enough records carry valid embeddings; a topic/emotion/recency
//! heuristic takes over otherwise.
//!
//! ## Architecture
//!
//! - **Embedder**: provider call with validation and a deterministic fallback
//! - **HttpEmbedder**: OpenAI-compatible `/v1/embeddings` adapter
//! - **RelevanceEngine**: vector search with heuristic fallback
//! - **format_context**: renders ranked memories into a prompt block
//! - **MemoryExtractor**: turns domain events into persisted memories
//! - **MemoryStore**: per-record upsert persistence (SQLite or in-memory)
//! - **MemoryProvider**: store + engine + formatter for one turn
//! - **Companion**: the full chat turn against a completion adapter

pub mod classifier;
pub mod companion;
pub mod embedder;
pub mod extractor;
pub mod formatter;
pub mod http;
pub mod insight;
pub mod provider;
pub mod retriever;
pub mod sqlite;
pub mod store;
pub mod summary;
pub mod types;

pub use companion::{Companion, TurnReply, TurnSettings};
pub use embedder::Embedder;
pub use extractor::{DomainEvent, MemoryExtractor, UrgeLevel};
pub use formatter::format_context;
pub use http::HttpEmbedder;
pub use provider::MemoryProvider;
pub use retriever::{RelevanceEngine, RelevanceSettings, Retrieval, RetrievalPath};
pub use sqlite::SqliteMemoryStore;
pub use store::{InMemoryMemoryStore, MemoryStore};
pub use types::*;
