// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Product CRUD handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use dataprep_pipeline_domain::entities::{ChunkingConfig, Product, QualityRuleSet};
use dataprep_pipeline_domain::value_objects::{ProductId, Version};
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

use crate::application::reconcile as reconcile_mod;

use super::error::require_write;
use super::{ApiError, ApiResult, ApiState, Principal};

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chunking_config: Option<ChunkingConfig>,
}

pub async fn create(
    State(state): State<ApiState>,
    principal: Principal,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    require_write(&principal)?;
    state
        .services
        .catalog
        .ensure_workspace(principal.workspace_id, &principal.subject)
        .await?;

    let product = Product::new(
        principal.workspace_id,
        request.name,
        request.description,
        request.chunking_config.unwrap_or_default(),
    )?;
    state.services.catalog.create_product(&product).await?;

    // Fresh products start from the baseline rule set; editors replace it
    // through the data-quality endpoints.
    let baseline = QualityRuleSet::baseline(product.id);
    state.services.catalog.put_rule_set(&baseline).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list(
    State(state): State<ApiState>,
    principal: Principal,
) -> ApiResult<Json<Vec<Product>>> {
    let products = state
        .services
        .catalog
        .list_products(principal.workspace_id)
        .await?;
    Ok(Json(products))
}

/// Loads a product and enforces workspace scoping.
pub(super) async fn load_scoped_product(
    state: &ApiState,
    principal: &Principal,
    id: &str,
) -> Result<Product, ApiError> {
    let product_id = ProductId::from_str(id)
        .map_err(|_| PipelineError::NotFound(format!("product {}", id)))?;
    let product = state.services.catalog.get_product(product_id).await?;
    if product.workspace_id != principal.workspace_id {
        return Err(PipelineError::NotFound(format!("product {}", id)).into());
    }
    Ok(product)
}

pub async fn detail(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let product = load_scoped_product(&state, &principal, &id).await?;
    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub chunking_config: Option<ChunkingConfig>,
}

pub async fn update(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<Json<Product>> {
    require_write(&principal)?;
    let mut product = load_scoped_product(&state, &principal, &id).await?;

    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(PipelineError::InvalidInput("product name must not be empty".into()).into());
        }
        product.name = name;
    }
    if let Some(description) = request.description {
        product.description = description;
    }
    if let Some(chunking) = request.chunking_config {
        chunking.validate()?;
        product.chunking_config = chunking;
    }
    product.updated_at = chrono::Utc::now();
    state.services.catalog.update_product(&product).await?;
    Ok(Json(product))
}

pub async fn delete(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_write(&principal)?;
    let product = load_scoped_product(&state, &principal, &id).await?;
    state.services.catalog.delete_product(product.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub version: u32,
}

pub async fn reconcile(
    State(state): State<ApiState>,
    principal: Principal,
    Path(id): Path<String>,
    Json(request): Json<ReconcileRequest>,
) -> ApiResult<Json<reconcile_mod::ReconcileReport>> {
    require_write(&principal)?;
    let product = load_scoped_product(&state, &principal, &id).await?;
    let report = reconcile_mod::reconcile(
        &state.services,
        principal.workspace_id,
        product.id,
        Version::new(request.version)?,
    )
    .await?;
    Ok(Json(report))
}
