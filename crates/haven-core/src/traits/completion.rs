// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion adapter trait for the LLM chat collaborator.

use async_trait::async_trait;

use crate::error::HavenError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for the language model that writes the companion's replies.
///
/// The reply may carry an `<INSIGHT>...</INSIGHT>` span; stripping it is
/// the caller's job.
#[async_trait]
pub trait CompletionAdapter: PluginAdapter {
    /// Sends a composed prompt and returns the full text completion.
    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, HavenError>;
}
