// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Embedding Providers
//!
//! Two implementations of the domain [`Embedder`] seam:
//!
//! - [`HttpEmbedder`] - remote provider speaking the common
//!   `POST /embeddings {model, input} -> {data: [{embedding}]}` shape
//! - [`HashEmbedder`] - deterministic local embedder used when no provider
//!   is configured and by the test suite; vectors are derived from content
//!   hashes and L2-normalized, so identical text always embeds identically

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use dataprep_pipeline_domain::services::Embedder;
use dataprep_pipeline_domain::PipelineError;

/// Remote embedding provider client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            dimension,
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut request = self.client.post(&self.endpoint).json(&serde_json::json!({
            "model": self.model,
            "input": texts,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                PipelineError::DependencyUnavailable(format!("embedding provider: {}", e))
            })?;
        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            PipelineError::DependencyUnavailable(format!("embedding response: {}", e))
        })?;

        if body.data.len() != texts.len() {
            return Err(PipelineError::DependencyUnavailable(format!(
                "embedding provider returned {} vectors for {} inputs",
                body.data.len(),
                texts.len()
            )));
        }
        let vectors: Vec<Vec<f32>> = body.data.into_iter().map(|d| d.embedding).collect();
        for v in &vectors {
            if v.len() != self.dimension {
                return Err(PipelineError::DependencyUnavailable(format!(
                    "embedding dimension {} does not match configured {}",
                    v.len(),
                    self.dimension
                )));
            }
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Deterministic hash-based embedder.
pub struct HashEmbedder {
    dimension: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: "local-hash".to_string(),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        while values.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();
            for pair in digest.chunks(2) {
                if values.len() == self.dimension {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]) as f32;
                values.push(raw / u16::MAX as f32 - 0.5);
            }
            counter += 1;
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut values {
                *v /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed(&["hello".to_string()]).await.unwrap();
        let b = embedder.embed(&["hello".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hash_embedder_dimension_and_norm() {
        let embedder = HashEmbedder::new(32);
        let vectors = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        for v in vectors {
            assert_eq!(v.len(), 32);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_different_texts_embed_differently() {
        let embedder = HashEmbedder::new(16);
        let vectors = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }
}
