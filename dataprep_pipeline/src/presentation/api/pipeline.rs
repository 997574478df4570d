// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ingest and pipeline-run handlers: trigger, list, detail, cancel, logs,
//! and artifact access.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

use dataprep_pipeline_domain::entities::{Artifact, PipelineRun, StageExecution};
use dataprep_pipeline_domain::value_objects::{ArtifactId, DataSourceId, RunId};
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog};
use dataprep_pipeline_domain::PipelineError;

use crate::application::{IngestRequest, IngestSummary, TriggerRequest, VersionSource};

use super::error::require_write;
use super::products::load_scoped_product;
use super::{ApiResult, ApiState, Principal};

/// Presigned artifact URLs stay valid this long.
const ARTIFACT_URL_TTL: Duration = Duration::from_secs(900);

// ----------------------------------------------------------------------
// Ingest
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IngestApiRequest {
    pub product_id: String,
    #[serde(default)]
    pub data_source_ids: Vec<String>,
    #[serde(default)]
    pub version: Option<u32>,
}

pub async fn trigger_ingest(
    State(state): State<ApiState>,
    principal: Principal,
    Json(request): Json<IngestApiRequest>,
) -> ApiResult<Json<IngestSummary>> {
    require_write(&principal)?;
    let product = load_scoped_product(&state, &principal, &request.product_id).await?;
    let mut source_ids = Vec::with_capacity(request.data_source_ids.len());
    for id in &request.data_source_ids {
        source_ids.push(
            DataSourceId::from_str(id)
                .map_err(|_| PipelineError::NotFound(format!("data source {}", id)))?,
        );
    }
    let summary = state
        .ingest
        .ingest(
            principal.workspace_id,
            IngestRequest {
                product_id: product.id,
                data_source_ids: source_ids,
                requested_version: request.version,
            },
        )
        .await?;
    Ok(Json(summary))
}

// ----------------------------------------------------------------------
// Runs
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TriggerApiRequest {
    pub product_id: String,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct TriggerApiResponse {
    pub run_id: String,
    pub product_id: String,
    pub version: u32,
    pub version_source: VersionSource,
    pub status: String,
    pub started_at: String,
}

pub async fn trigger_run(
    State(state): State<ApiState>,
    principal: Principal,
    Json(request): Json<TriggerApiRequest>,
) -> ApiResult<Json<TriggerApiResponse>> {
    require_write(&principal)?;
    let product = load_scoped_product(&state, &principal, &request.product_id).await?;
    let (run, version_source) = state
        .orchestrator
        .trigger(
            principal.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: request.version,
                force: request.force,
            },
        )
        .await?;
    Ok(Json(TriggerApiResponse {
        run_id: run.id.to_string(),
        product_id: run.product_id.to_string(),
        version: run.version.get(),
        version_source,
        status: run.status.as_str().to_string(),
        started_at: run.created_at.to_rfc3339(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub product_id: String,
}

pub async fn list_runs(
    State(state): State<ApiState>,
    principal: Principal,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<Vec<PipelineRun>>> {
    let product = load_scoped_product(&state, &principal, &query.product_id).await?;
    let runs = state.services.catalog.list_runs(product.id).await?;
    Ok(Json(runs))
}

async fn load_scoped_run(
    state: &ApiState,
    principal: &Principal,
    id: &str,
) -> Result<PipelineRun, PipelineError> {
    let run_id =
        RunId::from_str(id).map_err(|_| PipelineError::NotFound(format!("run {}", id)))?;
    let run = state.services.catalog.get_run(run_id).await?;
    if run.workspace_id != principal.workspace_id {
        return Err(PipelineError::NotFound(format!("run {}", id)));
    }
    Ok(run)
}

#[derive(Debug, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: PipelineRun,
    pub stages: Vec<StageExecution>,
}

pub async fn run_detail(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<RunDetail>> {
    let run = load_scoped_run(&state, &principal, &id).await?;
    let stages = state.services.catalog.list_stages(run.id).await?;
    Ok(Json(RunDetail { run, stages }))
}

pub async fn cancel_run(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<PipelineRun>> {
    require_write(&principal)?;
    let run = load_scoped_run(&state, &principal, &id).await?;
    let run = state.orchestrator.cancel(principal.workspace_id, run.id).await?;
    Ok(Json(run))
}

pub async fn run_logs(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let run = load_scoped_run(&state, &principal, &id).await?;
    let stages = state.services.catalog.list_stages(run.id).await?;
    let entries: Vec<serde_json::Value> = stages
        .iter()
        .map(|s| {
            json!({
                "stage": s.stage_name.as_str(),
                "status": s.status.as_str(),
                "started_at": s.started_at,
                "finished_at": s.finished_at,
                "metrics": s.metrics,
                "message": s.error_message,
            })
        })
        .collect();
    Ok(Json(json!({
        "run_id": run.id.to_string(),
        "status": run.status.as_str(),
        "error_message": run.error_message,
        "stages": entries,
    })))
}

// ----------------------------------------------------------------------
// Artifacts
// ----------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ArtifactView {
    #[serde(flatten)]
    pub artifact: Artifact,
    pub download_url: String,
}

pub async fn run_artifacts(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ArtifactView>>> {
    let run = load_scoped_run(&state, &principal, &id).await?;
    let artifacts = state.services.catalog.list_artifacts(run.id).await?;
    let mut views = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let download_url = state
            .services
            .blob
            .presign(&artifact.blob, ARTIFACT_URL_TTL)
            .await?;
        views.push(ArtifactView {
            artifact,
            download_url,
        });
    }
    Ok(Json(views))
}

pub async fn artifact_content(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let artifact_id = ArtifactId::from_str(&id)
        .map_err(|_| PipelineError::NotFound(format!("artifact {}", id)))?;
    let artifact = state.services.catalog.get_artifact(artifact_id).await?;
    // Scope through the owning run.
    let run = state.services.catalog.get_run(artifact.run_id).await?;
    if run.workspace_id != principal.workspace_id {
        return Err(PipelineError::NotFound(format!("artifact {}", id)).into());
    }

    let bytes = state.services.blob.get(&artifact.blob).await?;
    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            artifact.artifact_type.content_type(),
        )],
        bytes,
    )
        .into_response())
}
