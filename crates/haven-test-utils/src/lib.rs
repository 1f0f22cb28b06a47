// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Haven.
//!
//! Deterministic stand-ins for the embedding and completion collaborators so
//! tests run without network access.
//!
//! # Components
//!
//! - [`MockEmbedder`] - bag-of-words embedder with failure modes
//! - [`MockCompletion`] - completion adapter with scripted replies

pub mod mock_completion;
pub mod mock_embedder;

pub use mock_completion::MockCompletion;
pub use mock_embedder::MockEmbedder;
