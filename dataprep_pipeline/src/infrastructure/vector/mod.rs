// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vector Index Implementations
//!
//! - [`HttpVectorIndex`] - REST client for a points-style vector store
//!   (collection ensure, batched upsert keyed by chunk id, count by
//!   product/version filter)
//! - [`MemoryVectorIndex`] - in-process index for tests, enforcing the same
//!   dimension-consistency contract

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use dataprep_pipeline_domain::repositories::{VectorIndex, VectorPoint};
use dataprep_pipeline_domain::value_objects::{ProductId, Version};
use dataprep_pipeline_domain::PipelineError;

const COLLECTION: &str = "dataprep_chunks";

/// REST vector store client.
pub struct HttpVectorIndex {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpVectorIndex {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), path);
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }
}

fn vector_err(op: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::DependencyUnavailable(format!("vector store {}: {}", op, err))
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn ensure_ready(&self, dimension: usize) -> Result<(), PipelineError> {
        self.request(
            reqwest::Method::PUT,
            &format!("collections/{}", COLLECTION),
        )
        .json(&json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        }))
        .send()
        .await
        .map_err(|e| vector_err("ensure", e))?;
        // An already-existing collection answers with a conflict; both
        // outcomes leave the collection ready.
        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), PipelineError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({
            "points": points
                .iter()
                .map(|p| {
                    json!({
                        "id": p.chunk_id.as_str(),
                        "vector": p.vector,
                        "payload": p.payload,
                    })
                })
                .collect::<Vec<_>>()
        });
        self.request(
            reqwest::Method::PUT,
            &format!("collections/{}/points", COLLECTION),
        )
        .json(&body)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| vector_err("upsert", e))?;
        Ok(())
    }

    async fn count(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<u64, PipelineError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("collections/{}/points/count", COLLECTION),
            )
            .json(&json!({
                "filter": {
                    "must": [
                        { "key": "product_id", "match": { "value": product_id.to_string() } },
                        { "key": "version", "match": { "value": version.get() } }
                    ]
                }
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| vector_err("count", e))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| vector_err("count", e))?;
        Ok(body["result"]["count"].as_u64().unwrap_or(0))
    }
}

/// In-memory vector index for tests.
#[derive(Clone, Default)]
pub struct MemoryVectorIndex {
    dimension: Arc<RwLock<Option<usize>>>,
    points: Arc<RwLock<HashMap<String, VectorPoint>>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored points, for test assertions.
    pub fn point_count(&self) -> usize {
        self.points.read().len()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure_ready(&self, dimension: usize) -> Result<(), PipelineError> {
        let mut dim = self.dimension.write();
        match *dim {
            Some(existing) if existing != dimension => {
                Err(PipelineError::InvalidConfiguration(format!(
                    "vector index holds dimension {}, requested {}",
                    existing, dimension
                )))
            }
            _ => {
                *dim = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), PipelineError> {
        let expected = self.dimension.read().ok_or_else(|| {
            PipelineError::InvalidConfiguration("vector index not initialized".into())
        })?;
        for point in &points {
            if point.vector.len() != expected {
                return Err(PipelineError::InvalidInput(format!(
                    "vector for chunk {} has dimension {}, expected {}",
                    point.chunk_id,
                    point.vector.len(),
                    expected
                )));
            }
        }
        let mut store = self.points.write();
        for point in points {
            store.insert(point.chunk_id.as_str().to_string(), point);
        }
        Ok(())
    }

    async fn count(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<u64, PipelineError> {
        Ok(self
            .points
            .read()
            .values()
            .filter(|p| p.payload.product_id == product_id && p.payload.version == version)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_pipeline_domain::repositories::VectorPayload;
    use dataprep_pipeline_domain::value_objects::ChunkId;

    fn point(product: ProductId, version: Version, stem: &str, ordinal: u32) -> VectorPoint {
        VectorPoint {
            chunk_id: ChunkId::derive(product, version, stem, ordinal),
            vector: vec![0.0, 1.0],
            payload: VectorPayload {
                product_id: product,
                version,
                source_file: stem.to_string(),
                page_number: None,
                section: None,
            },
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_chunk_id() {
        let index = MemoryVectorIndex::new();
        index.ensure_ready(2).await.unwrap();
        let product = ProductId::new();
        let version = Version::first();

        index
            .upsert(vec![point(product, version, "a", 0)])
            .await
            .unwrap();
        index
            .upsert(vec![point(product, version, "a", 0)])
            .await
            .unwrap();

        assert_eq!(index.point_count(), 1);
        assert_eq!(index.count(product, version).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let index = MemoryVectorIndex::new();
        index.ensure_ready(3).await.unwrap();
        let product = ProductId::new();
        let result = index
            .upsert(vec![point(product, Version::first(), "a", 0)])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_count_is_version_scoped() {
        let index = MemoryVectorIndex::new();
        index.ensure_ready(2).await.unwrap();
        let product = ProductId::new();
        let v1 = Version::first();
        let v2 = v1.next();
        index
            .upsert(vec![
                point(product, v1, "a", 0),
                point(product, v2, "a", 0),
                point(product, v2, "a", 1),
            ])
            .await
            .unwrap();
        assert_eq!(index.count(product, v1).await.unwrap(), 1);
        assert_eq!(index.count(product, v2).await.unwrap(), 2);
    }
}
