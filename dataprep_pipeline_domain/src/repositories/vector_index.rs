// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vector Index Interface
//!
//! The downstream retrieval store embeddings are published to. Writes are
//! keyed by chunk id and idempotent: re-indexing a version overwrites its
//! points instead of duplicating them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::value_objects::{ChunkId, ProductId, Version};
use crate::PipelineError;

/// Retrieval metadata stored alongside each vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub product_id: ProductId,
    pub version: Version,
    pub source_file: String,
    pub page_number: Option<u32>,
    pub section: Option<String>,
}

/// One embedding with its key and payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Prepares the index for vectors of the given dimension. Idempotent.
    async fn ensure_ready(&self, dimension: usize) -> Result<(), PipelineError>;

    /// Upserts points keyed by chunk id.
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<(), PipelineError>;

    /// Number of points stored for a product version.
    async fn count(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<u64, PipelineError>;
}
