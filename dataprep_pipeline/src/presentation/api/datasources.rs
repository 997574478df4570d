// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Data source handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use dataprep_pipeline_domain::entities::{DataSource, SourceType};
use dataprep_pipeline_domain::repositories::Catalog;

use super::error::require_write;
use super::products::load_scoped_product;
use super::{ApiResult, ApiState, Principal};

#[derive(Debug, Deserialize)]
pub struct CreateDataSourceRequest {
    pub product_id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub config: serde_json::Value,
}

pub async fn create(
    State(state): State<ApiState>,
    principal: Principal,
    Json(request): Json<CreateDataSourceRequest>,
) -> ApiResult<(StatusCode, Json<DataSource>)> {
    require_write(&principal)?;
    let product = load_scoped_product(&state, &principal, &request.product_id).await?;
    let source = DataSource::new(
        principal.workspace_id,
        product.id,
        request.source_type,
        request.config,
    )?;
    state.services.catalog.create_data_source(&source).await?;
    Ok((StatusCode::CREATED, Json(source)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub product_id: String,
}

pub async fn list(
    State(state): State<ApiState>,
    principal: Principal,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<DataSource>>> {
    let product = load_scoped_product(&state, &principal, &query.product_id).await?;
    let sources = state.services.catalog.list_data_sources(product.id).await?;
    Ok(Json(sources))
}
