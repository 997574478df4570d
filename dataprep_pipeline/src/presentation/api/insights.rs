// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Insight handler: fingerprint, policy outcome, and optimizer
//! recommendations for a product's latest successful run.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use dataprep_pipeline_domain::entities::StageName;
use dataprep_pipeline_domain::value_objects::{BlobLocation, ReadinessFingerprint};
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog};
use dataprep_pipeline_domain::PipelineError;

use super::products::load_scoped_product;
use super::{ApiResult, ApiState, Principal};

pub async fn product_insights(
    State(state): State<ApiState>,
    principal: Principal,
    Path(product_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let product = load_scoped_product(&state, &principal, &product_id).await?;
    let run = state
        .services
        .catalog
        .latest_succeeded_run(product.id)
        .await?
        .ok_or_else(|| {
            PipelineError::NotFound(format!(
                "product {} has no successful run yet",
                product.id
            ))
        })?;

    let fingerprint_blob = state
        .services
        .blob
        .get(&BlobLocation::report(
            run.workspace_id,
            run.product_id,
            run.version,
            "fingerprint.json",
        ))
        .await?;
    let fingerprint: ReadinessFingerprint = serde_json::from_slice(&fingerprint_blob)
        .map_err(PipelineError::from)?;

    let stages = state.services.catalog.list_stages(run.id).await?;
    let policy = stages
        .iter()
        .find(|s| s.stage_name == StageName::Policy)
        .map(|s| {
            json!({
                "status": s.status.as_str(),
                "metrics": s.metrics,
            })
        });
    let violations = state
        .services
        .catalog
        .list_violations(product.id, Some(run.version))
        .await?;

    let recommendations = recommend(&fingerprint);
    Ok(Json(json!({
        "product_id": product.id.to_string(),
        "version": run.version.get(),
        "run_id": run.id.to_string(),
        "fingerprint": fingerprint,
        "policy": policy,
        "violation_count": violations.len(),
        "recommendations": recommendations,
    })))
}

/// Actionable hints derived from the weakest fingerprint components.
fn recommend(fingerprint: &ReadinessFingerprint) -> Vec<String> {
    let mut recommendations = Vec::new();
    if fingerprint.mean_completeness < 0.6 {
        recommendations.push(
            "Many chunks end mid-thought; raise target_tokens or review sentence splitting"
                .to_string(),
        );
    }
    if fingerprint.mean_accuracy < 0.6 {
        recommendations.push(
            "Chunk text carries decode artifacts or markup residue; review source encodings"
                .to_string(),
        );
    }
    if fingerprint.mean_quality < 0.5 {
        recommendations.push(
            "High repetition across chunks; consider boilerplate drop patterns in the playbook"
                .to_string(),
        );
    }
    if fingerprint.mean_timeliness < 0.5 {
        recommendations
            .push("Source material is aging; re-ingest from the upstream sources".to_string());
    }
    if fingerprint.mean_metadata_presence < 0.6 {
        recommendations.push(
            "Chunks lack provenance metadata; enable section fencing or page fences".to_string(),
        );
    }
    if recommendations.is_empty() {
        recommendations.push("No action needed; trust metrics are healthy".to_string());
    }
    recommendations
}
