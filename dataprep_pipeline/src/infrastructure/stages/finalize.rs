// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Finalize Stage
//!
//! Settles state after a successful pass: raw files move to PROCESSED, the
//! version becomes the product's promoted-version candidate, and the run
//! summary lands in the `report` bucket. Finalize is the one stage that
//! must not fail the run; problems are recorded as metrics and warnings.

use async_trait::async_trait;
use serde_json::json;

use dataprep_pipeline_domain::entities::{
    ArtifactDraft, ArtifactType, ProductStatus, RawFileStatus, StageName,
};
use dataprep_pipeline_domain::services::{RunBlackboard, Stage, StageContext, StageOutcome};
use dataprep_pipeline_domain::value_objects::BlobLocation;
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

/// Stage implementation for `finalize`.
pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> StageName {
        StageName::Finalize
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        let mut warnings: u64 = 0;

        let processed = match ctx
            .catalog
            .mark_version_files(
                ctx.product_id,
                ctx.version,
                &[RawFileStatus::Processing],
                RawFileStatus::Processed,
            )
            .await
        {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, "finalize could not mark files processed");
                warnings += 1;
                0
            }
        };

        match ctx.catalog.get_product(ctx.product_id).await {
            Ok(mut product) => {
                product.set_status(ProductStatus::Ready);
                if product.promote(ctx.version.get()).is_err() {
                    warnings += 1;
                }
                if let Err(err) = ctx.catalog.update_product(&product).await {
                    tracing::warn!(error = %err, "finalize could not update product");
                    warnings += 1;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "finalize could not load product");
                warnings += 1;
            }
        }

        let summary = json!({
            "run_id": ctx.run_id,
            "product_id": ctx.product_id,
            "version": ctx.version,
            "chunk_count": board.chunks.len(),
            "scored_count": board.scored.len(),
            "violation_count": board.violations.len(),
            "policy_verdict": board.verdict.map(|v| v.as_str()),
            "ai_trust_score": board.fingerprint.as_ref().map(|f| f.ai_trust_score),
            "embedded_count": board.indexing.as_ref().map(|r| r.embedded_count),
        });
        let location =
            BlobLocation::report(ctx.workspace_id, ctx.product_id, ctx.version, "summary.json");

        Ok(StageOutcome::succeeded()
            .with_metric("files_processed_count", processed as f64)
            .with_metric("finalize_warning_count", warnings as f64)
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Report,
                name: "summary.json".to_string(),
                display_name: Some("Run summary".to_string()),
                blob: location,
                bytes: serde_json::to_vec_pretty(&summary)
                    .unwrap_or_else(|_| b"{}".to_vec())
                    .into(),
            }))
    }
}
