// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fingerprint Stage
//!
//! Aggregates the per-chunk score vectors into the product-level readiness
//! fingerprint with its composite trust score, stores it as a JSON artifact
//! in the `report` bucket, and leaves it on the blackboard for the insight
//! surfaces.

use async_trait::async_trait;

use dataprep_pipeline_domain::entities::{ArtifactDraft, ArtifactType, StageName};
use dataprep_pipeline_domain::services::{RunBlackboard, Stage, StageContext, StageOutcome};
use dataprep_pipeline_domain::value_objects::{BlobLocation, ReadinessFingerprint};
use dataprep_pipeline_domain::PipelineError;

/// Stage implementation for `fingerprint`.
pub struct FingerprintStage;

#[async_trait]
impl Stage for FingerprintStage {
    fn name(&self) -> StageName {
        StageName::Fingerprint
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        if board.scored.is_empty() {
            return Ok(StageOutcome::failed("no scored chunks to fingerprint"));
        }

        let fingerprint = ReadinessFingerprint::aggregate(&board.scored, &ctx.trust_weights);
        let bytes = serde_json::to_vec_pretty(&fingerprint)?;
        let location =
            BlobLocation::report(ctx.workspace_id, ctx.product_id, ctx.version, "fingerprint.json");

        let outcome = StageOutcome::succeeded()
            .with_metric("ai_trust_score", fingerprint.ai_trust_score)
            .with_metric("mean_completeness", fingerprint.mean_completeness)
            .with_metric("mean_accuracy", fingerprint.mean_accuracy)
            .with_metric("mean_quality", fingerprint.mean_quality)
            .with_metric("mean_timeliness", fingerprint.mean_timeliness)
            .with_metric("mean_metadata_presence", fingerprint.mean_metadata_presence)
            .with_metric("chunk_count", fingerprint.chunk_count as f64)
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Json,
                name: "fingerprint.json".to_string(),
                display_name: Some("Readiness fingerprint".to_string()),
                blob: location,
                bytes: bytes.into(),
            });

        board.fingerprint = Some(fingerprint);
        Ok(outcome)
    }
}
