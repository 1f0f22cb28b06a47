// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Haven companion.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Haven configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HavenConfig {
    /// Companion identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Relevance engine settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Memory ingestion settings.
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Prompt composition settings.
    #[serde(default)]
    pub context: ContextConfig,
}

/// Companion identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the companion.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Static instructions placed at the top of every prompt.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_agent_name() -> String {
    "haven".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_system_prompt() -> String {
    "You are Haven, a warm and steady recovery companion. Use what you remember about \
     the user to stay consistent and supportive. When you notice a meaningful pattern or \
     breakthrough, wrap one short sentence describing it in <INSIGHT></INSIGHT> tags."
        .to_string()
}

/// Embedding provider configuration (OpenAI-compatible `/v1/embeddings`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Call the remote provider. When false every vector comes from the
    /// deterministic fallback generator.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the provider (without `/v1/embeddings`).
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// API key. `None` requires the `HAVEN_EMBEDDING_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Fixed vector dimension every stored embedding must have.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Character cap applied before submission.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// HTTP timeout for a single embedding call.
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            api_key: None,
            dimensions: default_dimensions(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_max_input_chars() -> usize {
    18_000
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Relevance engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Default number of memories returned per query.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Minimum share of memories with a valid embedding before vector
    /// search is attempted (0.0-1.0).
    #[serde(default = "default_vector_valid_ratio")]
    pub vector_valid_ratio: f64,

    /// Disable vector search entirely (always use the heuristic scorer).
    #[serde(default = "default_true")]
    pub vector_search: bool,

    /// Bonus added to the base score when dominant emotions match.
    #[serde(default = "default_emotion_bonus")]
    pub emotion_bonus: f64,

    /// Age in days after which the recency score reaches zero.
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: f64,

    /// Scale applied to the shared-topic ratio.
    #[serde(default = "default_topic_scale")]
    pub topic_scale: f64,

    /// Weights for the heuristic blend.
    #[serde(default)]
    pub weights: RetrievalWeightsConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            vector_valid_ratio: default_vector_valid_ratio(),
            vector_search: true,
            emotion_bonus: default_emotion_bonus(),
            recency_window_days: default_recency_window_days(),
            topic_scale: default_topic_scale(),
            weights: RetrievalWeightsConfig::default(),
        }
    }
}

fn default_max_results() -> usize {
    5
}

fn default_vector_valid_ratio() -> f64 {
    0.8
}

fn default_emotion_bonus() -> f64 {
    5.0
}

fn default_recency_window_days() -> f64 {
    10.0
}

fn default_topic_scale() -> f64 {
    10.0
}

/// Weights of the heuristic fallback blend.
///
/// `importance` is applied on top of the importance already folded into the
/// base score.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalWeightsConfig {
    #[serde(default = "default_weight_base")]
    pub base: f64,
    #[serde(default = "default_weight_recency")]
    pub recency: f64,
    #[serde(default = "default_weight_importance")]
    pub importance: f64,
    #[serde(default = "default_weight_access")]
    pub access: f64,
}

impl Default for RetrievalWeightsConfig {
    fn default() -> Self {
        Self {
            base: default_weight_base(),
            recency: default_weight_recency(),
            importance: default_weight_importance(),
            access: default_weight_access(),
        }
    }
}

fn default_weight_base() -> f64 {
    0.4
}

fn default_weight_recency() -> f64 {
    0.4
}

fn default_weight_importance() -> f64 {
    0.4
}

fn default_weight_access() -> f64 {
    0.2
}

/// Memory ingestion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    /// Enable ingestion. When false, domain events create no memories.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Build a client-side conversation summary every N turns.
    #[serde(default = "default_summary_interval")]
    pub summary_interval: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            summary_interval: default_summary_interval(),
        }
    }
}

fn default_summary_interval() -> usize {
    10
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("haven").join("haven.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("haven.db"))
        .to_string_lossy()
        .into_owned()
}

/// Prompt composition configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Number of recent messages carried into each prompt.
    #[serde(default = "default_recent_messages")]
    pub recent_messages: usize,

    /// Maximum tokens requested from the completion collaborator.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            recent_messages: default_recent_messages(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_recent_messages() -> usize {
    10
}

fn default_max_tokens() -> u32 {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = HavenConfig::default();
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.max_input_chars, 18_000);
        assert_eq!(config.retrieval.max_results, 5);
        assert!((config.retrieval.vector_valid_ratio - 0.8).abs() < f64::EPSILON);
        assert!((config.retrieval.weights.access - 0.2).abs() < f64::EPSILON);
        assert!(config.storage.database_path.ends_with("haven.db"));
    }

    #[test]
    fn weights_section_parses() {
        let toml_str = r#"
[retrieval.weights]
importance = 0.0
"#;
        let config: HavenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.retrieval.weights.importance, 0.0);
        assert!((config.retrieval.weights.recency - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_embedding_key_rejected() {
        let toml_str = r#"
[embedding]
dimension = 3072
"#;
        assert!(toml::from_str::<HavenConfig>(toml_str).is_err());
    }
}
