// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter.
//!
//! `MockEmbedder::new` hashes lowercase words into buckets and L2-normalizes
//! the counts, so identical text always yields identical unit vectors and
//! related text shares components. The other constructors model the
//! failure shapes a real provider produces.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use haven_core::error::HavenError;
use haven_core::traits::{EmbeddingAdapter, PluginAdapter};
use haven_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

#[derive(Debug, Clone)]
enum Mode {
    BagOfWords,
    Fixed(Vec<f32>),
    Failing,
    WrongDimension(usize),
    NonFinite,
}

/// Deterministic embedding adapter that records its calls.
#[derive(Debug)]
pub struct MockEmbedder {
    dimensions: usize,
    mode: Mode,
    calls: AtomicUsize,
    last_input: Mutex<Option<String>>,
}

impl MockEmbedder {
    fn with_mode(dimensions: usize, mode: Mode) -> Self {
        Self {
            dimensions,
            mode,
            calls: AtomicUsize::new(0),
            last_input: Mutex::new(None),
        }
    }

    /// Bag-of-words vectors of `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self::with_mode(dimensions, Mode::BagOfWords)
    }

    /// Returns `vector` for every input.
    pub fn fixed(vector: Vec<f32>) -> Self {
        Self::with_mode(vector.len(), Mode::Fixed(vector))
    }

    /// Every call fails with a provider error.
    pub fn failing(dimensions: usize) -> Self {
        Self::with_mode(dimensions, Mode::Failing)
    }

    /// Claims `dimensions` but returns `actual` components.
    pub fn wrong_dimension(dimensions: usize, actual: usize) -> Self {
        Self::with_mode(dimensions, Mode::WrongDimension(actual))
    }

    /// Right length, but one component is NaN.
    pub fn non_finite(dimensions: usize) -> Self {
        Self::with_mode(dimensions, Mode::NonFinite)
    }

    /// Number of `embed` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The last text submitted.
    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().unwrap().clone()
    }

    /// The vector this mock returns for `text` in bag-of-words mode,
    /// without counting a call.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions.max(1);
        let mut v = vec![0.0_f32; dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(&word.to_lowercase(), dims)] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            v[0] = 1.0;
        } else {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn produce(&self, text: &str) -> Result<Vec<f32>, HavenError> {
        match &self.mode {
            Mode::BagOfWords => Ok(self.vector_for(text)),
            Mode::Fixed(v) => Ok(v.clone()),
            Mode::Failing => Err(HavenError::Provider {
                message: "mock provider failure".to_string(),
                source: None,
            }),
            Mode::WrongDimension(actual) => Ok(vec![0.1; *actual]),
            Mode::NonFinite => {
                let mut v = vec![0.1; self.dimensions];
                if let Some(first) = v.first_mut() {
                    *first = f32::NAN;
                }
                Ok(v)
            }
        }
    }
}

// FNV-1a over the word bytes.
fn bucket(word: &str, dims: usize) -> usize {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in word.bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (h % dims as u64) as usize
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, HavenError> {
        Ok(match self.mode {
            Mode::Failing => HealthStatus::Unhealthy("mock provider failure".to_string()),
            _ => HealthStatus::Healthy,
        })
    }

    async fn shutdown(&self) -> Result<(), HavenError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, HavenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(last) = input.texts.last() {
            *self.last_input.lock().unwrap() = Some(last.clone());
        }
        let embeddings = input
            .texts
            .iter()
            .map(|t| self.produce(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}
