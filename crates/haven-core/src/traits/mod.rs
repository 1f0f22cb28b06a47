// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Haven collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod completion;
pub mod embedding;

pub use adapter::PluginAdapter;
pub use completion::CompletionAdapter;
pub use embedding::EmbeddingAdapter;
