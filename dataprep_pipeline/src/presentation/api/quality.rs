// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Quality rule and violation handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use dataprep_pipeline_domain::entities::{QualityRuleSet, QualityViolation};
use dataprep_pipeline_domain::value_objects::Version;
use dataprep_pipeline_domain::repositories::Catalog;

use super::error::require_write;
use super::products::load_scoped_product;
use super::{ApiResult, ApiState, Principal};

pub async fn get_rules(
    State(state): State<ApiState>,
    principal: Principal,
    Path(product_id): Path<String>,
) -> ApiResult<Json<QualityRuleSet>> {
    let product = load_scoped_product(&state, &principal, &product_id).await?;
    let rules = state.services.catalog.get_rule_set(product.id).await?;
    Ok(Json(rules))
}

/// Replacement rule set; the body carries only the rule families, the
/// server owns identity and versioning.
#[derive(Debug, Deserialize)]
pub struct PutRulesRequest {
    #[serde(default)]
    pub required_fields_rules: Vec<dataprep_pipeline_domain::entities::RequiredFieldsRule>,
    #[serde(default)]
    pub duplicate_rate_rules: Vec<dataprep_pipeline_domain::entities::DuplicateRateRule>,
    #[serde(default)]
    pub chunk_coverage_rules: Vec<dataprep_pipeline_domain::entities::ChunkCoverageRule>,
    #[serde(default)]
    pub bad_extensions_rules: Vec<dataprep_pipeline_domain::entities::BadExtensionsRule>,
    #[serde(default)]
    pub freshness_rules: Vec<dataprep_pipeline_domain::entities::FreshnessRule>,
    #[serde(default)]
    pub file_size_rules: Vec<dataprep_pipeline_domain::entities::FileSizeRule>,
    #[serde(default)]
    pub content_length_rules: Vec<dataprep_pipeline_domain::entities::ContentLengthRule>,
}

pub async fn put_rules(
    State(state): State<ApiState>,
    principal: Principal,
    Path(product_id): Path<String>,
    Json(request): Json<PutRulesRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_write(&principal)?;
    let product = load_scoped_product(&state, &principal, &product_id).await?;

    let set = QualityRuleSet {
        product_id: product.id,
        version: 0,
        required_fields_rules: request.required_fields_rules,
        duplicate_rate_rules: request.duplicate_rate_rules,
        chunk_coverage_rules: request.chunk_coverage_rules,
        bad_extensions_rules: request.bad_extensions_rules,
        freshness_rules: request.freshness_rules,
        file_size_rules: request.file_size_rules,
        content_length_rules: request.content_length_rules,
    };
    set.validate()?;
    let version = state.services.catalog.put_rule_set(&set).await?;
    Ok(Json(json!({
        "product_id": product.id.to_string(),
        "version": version,
        "rule_count": set.rule_count(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ViolationsQuery {
    pub product_id: String,
    #[serde(default)]
    pub version: Option<u32>,
}

pub async fn list_violations(
    State(state): State<ApiState>,
    principal: Principal,
    Query(query): Query<ViolationsQuery>,
) -> ApiResult<Json<Vec<QualityViolation>>> {
    let product = load_scoped_product(&state, &principal, &query.product_id).await?;
    let version = query.version.map(Version::new).transpose()?;
    let violations = state
        .services
        .catalog
        .list_violations(product.id, version)
        .await?;
    Ok(Json(violations))
}
