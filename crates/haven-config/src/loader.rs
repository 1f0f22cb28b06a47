// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./haven.toml` > `~/.config/haven/haven.toml` > `/etc/haven/haven.toml`
//! with environment variable overrides via `HAVEN_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::HavenConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/haven/haven.toml` (system-wide)
/// 3. `~/.config/haven/haven.toml` (user XDG config)
/// 4. `./haven.toml` (local directory)
/// 5. `HAVEN_*` environment variables
pub fn load_config() -> Result<HavenConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<HavenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HavenConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<HavenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(HavenConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(HavenConfig::default()))
        .merge(Toml::file("/etc/haven/haven.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("haven/haven.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("haven.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `HAVEN_EMBEDDING_API_KEY` must map to `embedding.api_key`.
fn env_provider() -> Env {
    Env::prefixed("HAVEN_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    if let Some(rest) = key.strip_prefix("retrieval_weights_") {
        return format!("retrieval.weights.{rest}");
    }
    for section in ["agent", "embedding", "retrieval", "ingestion", "storage", "context"] {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
