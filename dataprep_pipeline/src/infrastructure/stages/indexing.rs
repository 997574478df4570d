// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Indexing Stage
//!
//! Embeds the chunk set in batches with bounded fan-out, writes the packed
//! vectors to the `embed` bucket, and upserts points into the vector store
//! keyed by chunk id (idempotent across re-runs).
//!
//! Per-batch embedding failures are tolerated up to the configured failure
//! ratio; crossing the threshold fails the stage and with it the run. The
//! cancel flag is polled between batches.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use dataprep_pipeline_domain::entities::{ArtifactDraft, ArtifactType, StageName};
use dataprep_pipeline_domain::repositories::{VectorIndex, VectorPayload, VectorPoint};
use dataprep_pipeline_domain::services::{
    Embedder, IndexingReport, RunBlackboard, Stage, StageContext, StageOutcome,
};
use dataprep_pipeline_domain::value_objects::{BlobLocation, Chunk};
use dataprep_pipeline_domain::PipelineError;

/// Chunks embedded per provider call.
const EMBED_BATCH: usize = 32;

/// Stage implementation for `indexing`.
pub struct IndexingStage;

#[async_trait]
impl Stage for IndexingStage {
    fn name(&self) -> StageName {
        StageName::Indexing
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        if board.chunks.is_empty() {
            return Ok(StageOutcome::failed("no chunks to index"));
        }
        let dimension = ctx.embedder.dimension();
        ctx.vectors.ensure_ready(dimension).await?;

        let batches: Vec<Vec<Chunk>> = board
            .chunks
            .chunks(EMBED_BATCH)
            .map(|c| c.to_vec())
            .collect();
        let total_batches = batches.len();
        let mut embedded: Vec<(usize, Vec<Vec<f32>>)> = Vec::with_capacity(total_batches);
        let mut failed_chunks: u64 = 0;

        let mut results = stream::iter(batches.into_iter().enumerate().map(
            |(batch_index, batch)| {
                let embedder = ctx.embedder.clone();
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let batch_len = batch.len();
                async move { (batch_index, batch_len, embedder.embed(&texts).await) }
            },
        ))
        .buffer_unordered(ctx.tuning.chunk_concurrency.max(1));

        while let Some((batch_index, batch_len, result)) = results.next().await {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled("indexing".into()));
            }
            match result {
                Ok(vectors) => embedded.push((batch_index, vectors)),
                Err(err) => {
                    tracing::warn!(
                        batch = batch_index,
                        error = %err,
                        "embedding batch failed"
                    );
                    failed_chunks += batch_len as u64;
                }
            }
        }
        drop(results);

        let total_chunks = board.chunks.len() as u64;
        let failure_ratio = failed_chunks as f64 / total_chunks as f64;
        let embedded_count = total_chunks - failed_chunks;

        if failure_ratio > ctx.tuning.indexing_failure_ratio_threshold {
            board.indexing = Some(IndexingReport {
                embedded_count,
                failed_count: failed_chunks,
                dimension,
            });
            return Ok(StageOutcome::failed(format!(
                "embedding failure ratio {:.3} exceeds threshold {:.3}",
                failure_ratio, ctx.tuning.indexing_failure_ratio_threshold
            ))
            .with_metric("embedded_count", embedded_count as f64)
            .with_metric("failed_count", failed_chunks as f64)
            .with_metric("failure_ratio", failure_ratio));
        }

        // Reassemble in chunk order for the packed artifact and upsert.
        embedded.sort_by_key(|(batch_index, _)| *batch_index);
        let mut points = Vec::with_capacity(embedded_count as usize);
        let mut packed: Vec<u8> = Vec::with_capacity(embedded_count as usize * dimension * 4);
        for (batch_index, vectors) in &embedded {
            let start = batch_index * EMBED_BATCH;
            for (offset, vector) in vectors.iter().enumerate() {
                let chunk = &board.chunks[start + offset];
                for value in vector {
                    packed.extend_from_slice(&value.to_le_bytes());
                }
                points.push(VectorPoint {
                    chunk_id: chunk.chunk_id.clone(),
                    vector: vector.clone(),
                    payload: VectorPayload {
                        product_id: ctx.product_id,
                        version: ctx.version,
                        source_file: chunk.source_file.clone(),
                        page_number: chunk.page_number,
                        section: chunk.section.clone(),
                    },
                });
            }
        }
        ctx.vectors.upsert(points).await?;

        let location = BlobLocation::vectors_bin(ctx.workspace_id, ctx.product_id, ctx.version);
        board.indexing = Some(IndexingReport {
            embedded_count,
            failed_count: failed_chunks,
            dimension,
        });

        Ok(StageOutcome::succeeded()
            .with_metric("embedded_count", embedded_count as f64)
            .with_metric("failed_count", failed_chunks as f64)
            .with_metric("failure_ratio", failure_ratio)
            .with_metric("dimension_count", dimension as f64)
            .with_metric("batch_count", total_batches as f64)
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Vector,
                name: "vectors.bin".to_string(),
                display_name: Some("Packed embeddings".to_string()),
                blob: location,
                bytes: packed.into(),
            }))
    }
}
