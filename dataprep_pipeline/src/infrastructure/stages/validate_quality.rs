// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Vector Readiness Stage (`validate_quality`)
//!
//! Cross-checks indexing completeness against the chunk set: embedding
//! success rate, dimension consistency, and the point count the vector
//! store actually reports for this product version. Emits the
//! vector-readiness metrics the insight surfaces read.

use async_trait::async_trait;

use dataprep_pipeline_domain::entities::StageName;
use dataprep_pipeline_domain::repositories::VectorIndex;
use dataprep_pipeline_domain::services::{
    Embedder, RunBlackboard, Stage, StageContext, StageOutcome,
};
use dataprep_pipeline_domain::PipelineError;

/// Stage implementation for `validate_quality`.
pub struct ValidateQualityStage;

#[async_trait]
impl Stage for ValidateQualityStage {
    fn name(&self) -> StageName {
        StageName::ValidateQuality
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        let Some(report) = &board.indexing else {
            return Ok(StageOutcome::failed("indexing left no report to validate"));
        };
        let chunk_count = board.chunks.len() as u64;
        let stored = ctx.vectors.count(ctx.product_id, ctx.version).await?;

        let success_rate = if chunk_count == 0 {
            0.0
        } else {
            report.embedded_count as f64 / chunk_count as f64
        };
        let coverage = if chunk_count == 0 {
            0.0
        } else {
            stored.min(chunk_count) as f64 / chunk_count as f64
        };
        let dimension_consistent = report.dimension == ctx.embedder.dimension();
        let store_complete = stored >= report.embedded_count;

        let outcome = if !dimension_consistent {
            StageOutcome::failed(format!(
                "vector dimension {} does not match embedder dimension {}",
                report.dimension,
                ctx.embedder.dimension()
            ))
        } else if !store_complete {
            StageOutcome::failed(format!(
                "vector store holds {} points but {} were embedded",
                stored, report.embedded_count
            ))
        } else {
            StageOutcome::succeeded()
        };

        Ok(outcome
            .with_metric("embedding_success_rate", success_rate)
            .with_metric("vector_coverage", coverage)
            .with_metric("stored_vector_count", stored as f64)
            .with_metric(
                "dimension_consistent",
                if dimension_consistent { 1.0 } else { 0.0 },
            ))
    }
}
