// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP embedding adapter for OpenAI-compatible `/v1/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use haven_config::model::EmbeddingConfig;
use haven_core::error::HavenError;
use haven_core::traits::{EmbeddingAdapter, PluginAdapter};
use haven_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EMBEDDINGS_PATH: &str = "/v1/embeddings";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding adapter backed by a remote HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: SecretString) -> Result<Self, HavenError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|e| HavenError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| HavenError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}{EMBEDDINGS_PATH}", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, HavenError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(status = %status, count = texts.len(), "embedding response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HavenError::Provider {
                message: format!("embedding API returned {status}: {body}"),
                source: None,
            });
        }

        let mut parsed: EmbeddingResponse =
            response.json().await.map_err(|e| HavenError::Provider {
                message: format!("malformed embedding response: {e}"),
                source: Some(Box::new(e)),
            })?;

        if parsed.data.len() != texts.len() {
            return Err(HavenError::Provider {
                message: format!(
                    "expected {} embeddings, provider returned {}",
                    texts.len(),
                    parsed.data.len()
                ),
                source: None,
            });
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn transport_error(&self, e: reqwest::Error) -> HavenError {
        if e.is_timeout() {
            HavenError::Timeout {
                duration: self.timeout,
            }
        } else {
            HavenError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            }
        }
    }
}

#[async_trait]
impl PluginAdapter for HttpEmbedder {
    fn name(&self) -> &str {
        "http-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, HavenError> {
        match self.request(&["health check".to_string()]).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), HavenError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for HttpEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, HavenError> {
        let embeddings = self.request(&input.texts).await?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}
