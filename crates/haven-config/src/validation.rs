// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive dimensions, ratios within [0, 1], and finite weights.

use crate::diagnostic::ConfigError;
use crate::model::HavenConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &HavenConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        fail(format!(
            "agent.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.agent.log_level
        ));
    }

    if config.embedding.dimensions == 0 {
        fail("embedding.dimensions must be greater than 0".to_string());
    }

    if config.embedding.max_input_chars == 0 {
        fail("embedding.max_input_chars must be greater than 0".to_string());
    }

    if config.embedding.enabled && config.embedding.base_url.trim().is_empty() {
        fail("embedding.base_url must not be empty when embedding is enabled".to_string());
    }

    if config.embedding.timeout_secs == 0 {
        fail("embedding.timeout_secs must be greater than 0".to_string());
    }

    let ratio = config.retrieval.vector_valid_ratio;
    if !(0.0..=1.0).contains(&ratio) {
        fail(format!(
            "retrieval.vector_valid_ratio must be within 0.0-1.0, got {ratio}"
        ));
    }

    if config.retrieval.max_results == 0 {
        fail("retrieval.max_results must be greater than 0".to_string());
    }

    if !(config.retrieval.recency_window_days.is_finite()
        && config.retrieval.recency_window_days > 0.0)
    {
        fail(format!(
            "retrieval.recency_window_days must be a positive number, got {}",
            config.retrieval.recency_window_days
        ));
    }

    let weights = &config.retrieval.weights;
    for (name, value) in [
        ("base", weights.base),
        ("recency", weights.recency),
        ("importance", weights.importance),
        ("access", weights.access),
        ("emotion_bonus", config.retrieval.emotion_bonus),
        ("topic_scale", config.retrieval.topic_scale),
    ] {
        if !value.is_finite() || value < 0.0 {
            fail(format!(
                "retrieval weight `{name}` must be a non-negative number, got {value}"
            ));
        }
    }

    if config.ingestion.summary_interval == 0 {
        fail("ingestion.summary_interval must be greater than 0".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
