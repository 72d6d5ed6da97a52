//! Cross-encoder reranker client.
//!
//! The search service treats reranking as best-effort: a failure here
//! degrades the query to post-fusion order instead of failing it.

use crate::config::RerankConfig;
use crate::error::RerankError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for rerank providers.
///
/// `rerank` returns one score per passage, in passage order; higher means
/// more relevant. Passages outside the endpoint's top-N score zero.
#[async_trait]
pub trait RerankProvider: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
        top_n: usize,
    ) -> Result<Vec<f32>, RerankError>;
}

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankEntry>,
}

#[derive(Deserialize)]
struct RerankEntry {
    index: usize,
    relevance_score: f32,
}

/// HTTP reranker speaking the `{model, query, documents, top_n}` contract.
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(config: &RerankConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl RerankProvider for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        passages: &[String],
        top_n: usize,
    ) -> Result<Vec<f32>, RerankError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let body = RerankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents: passages.to_vec(),
            top_n,
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| RerankError::Network {
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RerankError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RerankResponse =
            response
                .json()
                .await
                .map_err(|e| RerankError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        let mut scores = vec![0.0f32; passages.len()];
        for entry in parsed.results {
            if entry.index >= scores.len() {
                return Err(RerankError::InvalidResponse {
                    reason: format!(
                        "result index {} out of range for {} documents",
                        entry.index,
                        scores.len()
                    ),
                });
            }
            scores[entry.index] = entry.relevance_score;
        }
        Ok(scores)
    }
}
