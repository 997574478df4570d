// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Embedding Provider Interface
//!
//! The narrow seam to whatever model turns chunk text into vectors. The
//! indexing stage only depends on this trait; provider specifics (HTTP
//! shape, auth, batching limits) stay in the infrastructure layer.

use async_trait::async_trait;

use crate::PipelineError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a batch of texts, one vector per input, in order.
    ///
    /// The whole batch fails or succeeds together; the indexing stage
    /// batches narrowly enough that a failed batch is an acceptable loss
    /// unit counted against the failure-ratio threshold.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Dimension every returned vector has.
    fn dimension(&self) -> usize;

    /// Identifier of the model, recorded in run metrics and payloads.
    fn model_id(&self) -> &str;
}
