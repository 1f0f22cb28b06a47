// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding service: validation, truncation and the deterministic fallback.
//!
//! Every vector that reaches storage or similarity math passes
//! [`validate_embedding`]: exactly `dimensions` components, all finite.
//! When the provider fails, [`Embedder::embed_or_fallback`] substitutes a
//! hash-seeded pseudo-random vector so ingestion never blocks on the network.

use std::sync::Arc;

use haven_config::model::EmbeddingConfig;
use haven_core::error::HavenError;
use haven_core::traits::EmbeddingAdapter;
use haven_core::types::EmbeddingInput;
use tracing::{debug, warn};

/// Multiplier of the 64-bit LCG behind the fallback generator.
const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// Checks that a vector has exactly `dimensions` finite components.
pub fn validate_embedding(vector: &[f32], dimensions: usize) -> Result<(), HavenError> {
    if vector.len() != dimensions {
        return Err(HavenError::Validation {
            message: format!("expected {dimensions} components, got {}", vector.len()),
        });
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(HavenError::Validation {
            message: format!("component {pos} is not finite"),
        });
    }
    Ok(())
}

pub fn is_valid_embedding(vector: &[f32], dimensions: usize) -> bool {
    validate_embedding(vector, dimensions).is_ok()
}

/// Drops a stored embedding that fails validation.
pub fn sanitize_embedding(embedding: Option<Vec<f32>>, dimensions: usize) -> Option<Vec<f32>> {
    embedding.filter(|v| is_valid_embedding(v, dimensions))
}

/// 32-bit rolling string hash (`h = h * 31 + c`, wrapping).
pub fn rolling_hash(text: &str) -> u32 {
    text.chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32))
}

/// Deterministic stand-in vector for `text`, components in [-1, 1].
///
/// Carries no semantic meaning. Identical text always yields the identical
/// vector, which keeps exact-duplicate lookups working offline.
pub fn fallback_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut state = u64::from(rolling_hash(text)) ^ 0x9E37_79B9_7F4A_7C15;
    (0..dimensions)
        .map(|_| {
            state = state
                .wrapping_mul(LCG_MULTIPLIER)
                .wrapping_add(LCG_INCREMENT);
            // Top 53 bits give a uniform double in [0, 1).
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            (unit * 2.0 - 1.0) as f32
        })
        .collect()
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Embedding front-end shared by retrieval and ingestion.
pub struct Embedder {
    /// `None` when the remote provider is disabled; every call falls back.
    adapter: Option<Arc<dyn EmbeddingAdapter>>,
    dimensions: usize,
    max_input_chars: usize,
}

impl Embedder {
    pub fn new(
        adapter: Arc<dyn EmbeddingAdapter>,
        dimensions: usize,
        max_input_chars: usize,
    ) -> Self {
        Self {
            adapter: Some(adapter),
            dimensions,
            max_input_chars,
        }
    }

    /// An embedder that never calls out and always uses the fallback.
    pub fn fallback_only(dimensions: usize, max_input_chars: usize) -> Self {
        Self {
            adapter: None,
            dimensions,
            max_input_chars,
        }
    }

    pub fn from_config(adapter: Option<Arc<dyn EmbeddingAdapter>>, config: &EmbeddingConfig) -> Self {
        match adapter {
            Some(adapter) if config.enabled => {
                Self::new(adapter, config.dimensions, config.max_input_chars)
            }
            _ => Self::fallback_only(config.dimensions, config.max_input_chars),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn is_valid(&self, vector: &[f32]) -> bool {
        is_valid_embedding(vector, self.dimensions)
    }

    /// Embeds `text` with the provider and validates the result.
    ///
    /// Input longer than the character cap is truncated first. Empty or
    /// whitespace-only input is rejected without a provider call.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, HavenError> {
        if text.trim().is_empty() {
            return Err(HavenError::EmptyInput);
        }
        let adapter = self.adapter.as_ref().ok_or_else(|| HavenError::Provider {
            message: "embedding provider disabled".to_string(),
            source: None,
        })?;

        let input = truncate_chars(text, self.max_input_chars);
        let output = adapter
            .embed(EmbeddingInput {
                texts: vec![input.to_string()],
            })
            .await?;

        let vector = output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| HavenError::Provider {
                message: "provider returned no embedding".to_string(),
                source: None,
            })?;
        validate_embedding(&vector, self.dimensions)?;
        Ok(vector)
    }

    /// Like [`Embedder::embed`] but substitutes the fallback vector when the
    /// provider fails or hands back an invalid vector.
    ///
    /// Only [`HavenError::EmptyInput`] escapes.
    pub async fn embed_or_fallback(&self, text: &str) -> Result<Vec<f32>, HavenError> {
        if self.adapter.is_none() {
            if text.trim().is_empty() {
                return Err(HavenError::EmptyInput);
            }
            return Ok(self.fallback_for(text));
        }
        match self.embed(text).await {
            Ok(vector) => Ok(vector),
            Err(e) if e.is_recoverable_embedding_failure() => {
                warn!(error = %e, "embedding failed, using fallback vector");
                Ok(self.fallback_for(text))
            }
            Err(e) => Err(e),
        }
    }

    fn fallback_for(&self, text: &str) -> Vec<f32> {
        debug!(dimensions = self.dimensions, "generating fallback embedding");
        fallback_embedding(truncate_chars(text, self.max_input_chars), self.dimensions)
    }
}
