//! Embedding provider trait and implementations.
//!
//! The indexer and search service depend only on [`EmbeddingProvider`].
//! [`HttpEmbeddingClient`] talks to an OpenAI-shaped embeddings endpoint
//! with adaptive rate control; [`OfflineEmbeddings`] is a deterministic
//! local provider used by tests and offline smoke runs.

mod rate_limit;

pub use rate_limit::{AdaptiveRateLimiter, RatePermit};

use crate::config::EmbeddingConfig;
use crate::error::{EmbedResult, EmbeddingError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

/// Bounded retries for network-class failures.
const NETWORK_MAX_RETRIES: u32 = 3;

/// Base delay for network retry backoff.
const NETWORK_RETRY_BASE: Duration = Duration::from_secs(1);

/// Progress event emitted once per completed API batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedProgress {
    pub completed_batches: usize,
    pub total_batches: usize,
}

/// Trait for embedding providers.
///
/// Implementations must be safe for concurrent callers; `embed_batch`
/// returns vectors in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_batch(
        &self,
        texts: &[String],
        progress: Option<mpsc::Sender<EmbedProgress>>,
    ) -> EmbedResult<Vec<Vec<f32>>>;

    /// The vector width every returned embedding must have.
    fn dimensions(&self) -> usize;
}

/// Request body for the embeddings endpoint
#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    encoding_format: &'static str,
}

/// Response from the embeddings endpoint
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP embedding client with adaptive rate limiting.
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    api_batch: usize,
    limiter: Arc<AdaptiveRateLimiter>,
}

impl HttpEmbeddingClient {
    /// Build a client from configuration, sharing the given controller.
    pub fn new(config: &EmbeddingConfig, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
            api_batch: config.api_batch.max(1),
            limiter,
        }
    }

    /// One API round trip with the full retry policy applied.
    async fn send_batch(&self, texts: Vec<String>) -> EmbedResult<Vec<Vec<f32>>> {
        let mut network_retries = 0u32;
        loop {
            let permit = self.limiter.acquire().await;
            match self.request(&texts).await {
                Ok(vectors) => {
                    self.limiter.on_success();
                    drop(permit);
                    return Ok(vectors);
                }
                Err(e) if e.is_rate_limited() => {
                    drop(permit);
                    self.limiter.backoff_pause().await;
                }
                Err(e) if e.is_transient() && network_retries < NETWORK_MAX_RETRIES => {
                    drop(permit);
                    let wait = NETWORK_RETRY_BASE * 2u32.pow(network_retries);
                    network_retries += 1;
                    debug!(
                        attempt = network_retries,
                        wait_secs = wait.as_secs(),
                        "transient embedding failure, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    drop(permit);
                    return Err(e);
                }
            }
        }
    }

    async fn request(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            encoding_format: "float",
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| EmbeddingError::Network {
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    reason: e.to_string(),
                })?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse {
                reason: format!(
                    "endpoint returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    texts.len()
                ),
            });
        }

        let mut by_index = parsed.data;
        by_index.sort_by_key(|d| d.index);
        let mut vectors = Vec::with_capacity(by_index.len());
        for d in by_index {
            if d.embedding.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: d.embedding.len(),
                });
            }
            vectors.push(d.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed_batch(
        &self,
        texts: &[String],
        progress: Option<mpsc::Sender<EmbedProgress>>,
    ) -> EmbedResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.api_batch)
            .map(|c| c.to_vec())
            .collect();
        let total_batches = batches.len();

        let mut set = JoinSet::new();
        for (i, batch) in batches.into_iter().enumerate() {
            let this = self.clone();
            set.spawn(async move { (i, this.send_batch(batch).await) });
        }

        let mut results: Vec<Option<Vec<Vec<f32>>>> = vec![None; total_batches];
        let mut completed = 0;
        while let Some(joined) = set.join_next().await {
            let (i, result) = joined.map_err(|e| EmbeddingError::Network {
                reason: format!("embedding task aborted: {e}"),
            })?;
            results[i] = Some(result?);
            completed += 1;
            if let Some(tx) = &progress {
                let _ = tx
                    .send(EmbedProgress {
                        completed_batches: completed,
                        total_batches,
                    })
                    .await;
            }
        }

        Ok(results.into_iter().flatten().flatten().collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Deterministic local embeddings from hashed token counts.
///
/// Texts sharing tokens land near each other in the space, which is enough
/// for integration tests and offline smoke runs. The same text always maps
/// to the same vector.
#[derive(Debug, Clone)]
pub struct OfflineEmbeddings {
    dimensions: usize,
}

impl OfflineEmbeddings {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let slot = u64::from_le_bytes(digest[..8].try_into().unwrap());
            vector[(slot % self.dimensions as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for OfflineEmbeddings {
    async fn embed_batch(
        &self,
        texts: &[String],
        progress: Option<mpsc::Sender<EmbedProgress>>,
    ) -> EmbedResult<Vec<Vec<f32>>> {
        let vectors = texts.iter().map(|t| self.embed_one(t)).collect();
        if let Some(tx) = &progress {
            let _ = tx
                .send(EmbedProgress {
                    completed_batches: 1,
                    total_batches: 1,
                })
                .await;
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
