// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Control API
//!
//! The HTTP surface for product CRUD, ingest and pipeline triggers, run
//! inspection, quality rules, and the insight endpoints. Thin by contract:
//! handlers authenticate, validate, and delegate to the application layer;
//! no business logic lives here.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::application::{IngestCoordinator, PipelineOrchestrator, Services};

pub mod auth;
pub mod chunks;
pub mod datasources;
pub mod error;
pub mod insights;
pub mod pipeline;
pub mod products;
pub mod quality;

pub use auth::{Principal, Role, SharedVerifier, StaticTokenVerifier, TokenVerifier};
pub use error::{ApiError, ApiResult};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<Services>,
    pub ingest: IngestCoordinator,
    pub orchestrator: PipelineOrchestrator,
    pub verifier: SharedVerifier,
}

/// Builds the full router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(
            "/api/v1/products",
            post(products::create).get(products::list),
        )
        .route(
            "/api/v1/products/:id",
            get(products::detail)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/api/v1/products/:id/reconcile", post(products::reconcile))
        .route(
            "/api/v1/datasources",
            post(datasources::create).get(datasources::list),
        )
        .route("/api/v1/ingest", post(pipeline::trigger_ingest))
        .route("/api/v1/pipeline/run", post(pipeline::trigger_run))
        .route("/api/v1/pipeline/runs", get(pipeline::list_runs))
        .route("/api/v1/pipeline/runs/:id", get(pipeline::run_detail))
        .route("/api/v1/pipeline/runs/:id/cancel", post(pipeline::cancel_run))
        .route("/api/v1/pipeline/runs/:id/logs", get(pipeline::run_logs))
        .route(
            "/api/v1/pipeline/runs/:id/artifacts",
            get(pipeline::run_artifacts),
        )
        .route(
            "/api/v1/pipeline/artifacts/:id/content",
            get(pipeline::artifact_content),
        )
        .route(
            "/api/v1/data-quality/rules/:product_id",
            get(quality::get_rules).put(quality::put_rules),
        )
        .route(
            "/api/v1/data-quality/violations",
            get(quality::list_violations),
        )
        .route("/api/v1/insights/:product_id", get(insights::product_insights))
        .route("/api/v1/chunks/:product_id", get(chunks::query_chunks))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(
    axum::extract::State(state): axum::extract::State<ApiState>,
) -> Result<String, ApiError> {
    Ok(state.services.metrics.render()?)
}
