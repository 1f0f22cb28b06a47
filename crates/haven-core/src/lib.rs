// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Haven companion.
//!
//! This crate provides the trait definitions for the external collaborators
//! (embedding provider, LLM completion), the shared error type, and common
//! types used throughout the Haven workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::HavenError;
pub use types::{AdapterType, HealthStatus, UserId};

pub use traits::{CompletionAdapter, EmbeddingAdapter, PluginAdapter};
