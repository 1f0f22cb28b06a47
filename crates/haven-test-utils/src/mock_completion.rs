// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock completion adapter for deterministic chat-turn tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use haven_core::error::HavenError;
use haven_core::traits::{CompletionAdapter, PluginAdapter};
use haven_core::types::{AdapterType, CompletionRequest, CompletionResponse, HealthStatus};

/// A completion adapter that replies from a FIFO script.
///
/// When the script runs out, "mock response" is returned. Every request is
/// recorded for inspection.
pub struct MockCompletion {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    failing: bool,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    /// Pre-loaded with `responses`, returned in order.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            ..Self::new()
        }
    }

    /// Every call fails with a completion error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(text.into());
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockCompletion {
    fn name(&self) -> &str {
        "mock-completion"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }

    async fn health_check(&self) -> Result<HealthStatus, HavenError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), HavenError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for MockCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, HavenError> {
        self.requests.lock().unwrap().push(request);
        if self.failing {
            return Err(HavenError::Completion {
                message: "mock completion failure".to_string(),
                source: None,
            });
        }
        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string());
        Ok(CompletionResponse { content })
    }
}
