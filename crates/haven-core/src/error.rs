// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Haven companion.

use thiserror::Error;

/// The primary error type used across all Haven adapter traits and core operations.
///
/// The memory engine absorbs most of these locally: provider and validation
/// failures degrade to fallback vectors or heuristic ranking, and an
/// unavailable store degrades to an empty collection.
#[derive(Debug, Error)]
pub enum HavenError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// The persistence collaborator could not hand back or accept a collection.
    #[error("memory store unavailable: {source}")]
    StoreUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Embedding provider failure (transport, non-2xx, malformed payload).
    #[error("embedding provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A vector failed the dimension/finiteness check.
    #[error("embedding validation failed: {message}")]
    Validation { message: String },

    /// Caller attempted to embed empty or whitespace-only text.
    #[error("cannot embed empty input")]
    EmptyInput,

    /// LLM completion collaborator failure.
    #[error("completion error: {message}")]
    Completion {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HavenError {
    /// Wraps any error as a store failure.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        HavenError::StoreUnavailable {
            source: Box::new(err),
        }
    }

    /// Returns true for failures the embedding layer recovers from with the
    /// fallback generator.
    pub fn is_recoverable_embedding_failure(&self) -> bool {
        matches!(
            self,
            HavenError::Provider { .. } | HavenError::Validation { .. } | HavenError::Timeout { .. }
        )
    }
}
