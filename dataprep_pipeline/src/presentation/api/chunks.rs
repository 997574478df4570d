// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Chunk metadata query handler.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use dataprep_pipeline_domain::repositories::{ChunkQuery, MAX_CHUNK_PAGE};
use dataprep_pipeline_domain::value_objects::Version;
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

use super::products::load_scoped_product;
use super::{ApiResult, ApiState, Principal};

#[derive(Debug, Deserialize)]
pub struct ChunksQuery {
    pub version: Option<u32>,
    pub section: Option<String>,
    pub field: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub async fn query_chunks(
    State(state): State<ApiState>,
    principal: Principal,
    Path(product_id): Path<String>,
    Query(query): Query<ChunksQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let product = load_scoped_product(&state, &principal, &product_id).await?;

    let version = match query.version {
        Some(v) => Version::new(v)?,
        None => {
            if product.current_version == 0 {
                return Err(PipelineError::NotFound(format!(
                    "product {} has no ingested version",
                    product.id
                ))
                .into());
            }
            Version::new(product.current_version)?
        }
    };
    let limit = query.limit.unwrap_or(100).min(MAX_CHUNK_PAGE).max(1);
    let offset = query.offset.unwrap_or(0);

    let records = state
        .services
        .catalog
        .query_chunk_records(&ChunkQuery {
            product_id: product.id,
            version,
            section: query.section,
            field_name: query.field,
            limit,
            offset,
        })
        .await?;

    Ok(Json(json!({
        "product_id": product.id.to_string(),
        "version": version.get(),
        "limit": limit,
        "offset": offset,
        "count": records.len(),
        "chunks": records,
    })))
}
