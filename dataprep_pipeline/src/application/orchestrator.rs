// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator - Trigger Surface
//!
//! Resolves the target version, enforces the idempotency rules, and queues
//! runs for the worker pool. The DAG execution itself lives in
//! [`crate::application::worker`].
//!
//! ## Idempotency
//!
//! - A QUEUED/RUNNING run for the `(product, version)` pair rejects a new
//!   trigger with `RunAlreadyActive`.
//! - A SUCCEEDED run rejects re-triggering unless `force` is set.
//! - A failed or cancelled run may be retriggered freely; a new run id is
//!   minted every time.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Notify;

use dataprep_pipeline_domain::entities::{
    PipelineRun, ProductStatus, RunStatus, TriggerReason,
};
use dataprep_pipeline_domain::value_objects::{ProductId, RunId, WorkspaceId};
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::services::{Embedder, Quota};
use dataprep_pipeline_domain::PipelineError;

use crate::application::services::Services;

/// Where the run's version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    Explicit,
    Auto,
}

/// A trigger request after API validation.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub product_id: ProductId,
    pub version: Option<u32>,
    pub force: bool,
}

/// Queues pipeline runs and exposes cancellation.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    services: Arc<Services>,
    /// Nudges idle workers when a run is queued.
    wake: Arc<Notify>,
}

impl PipelineOrchestrator {
    pub fn new(services: Arc<Services>, wake: Arc<Notify>) -> Self {
        Self { services, wake }
    }

    /// Queues a run for the resolved version.
    pub async fn trigger(
        &self,
        workspace_id: WorkspaceId,
        request: TriggerRequest,
    ) -> Result<(PipelineRun, VersionSource), PipelineError> {
        self.services.quota.check_run(workspace_id).await?;

        let mut product = self.services.catalog.get_product(request.product_id).await?;
        if product.workspace_id != workspace_id {
            return Err(PipelineError::NotFound(format!(
                "product {}",
                request.product_id
            )));
        }

        let version_source = if request.version.is_some() {
            VersionSource::Explicit
        } else {
            VersionSource::Auto
        };
        let version = self
            .services
            .catalog
            .resolve_pipeline_version(product.id, request.version)
            .await?;

        if self
            .services
            .catalog
            .has_succeeded_run(product.id, version)
            .await?
            && !request.force
        {
            return Err(PipelineError::AlreadySucceeded {
                product_id: product.id.to_string(),
                version: version.get(),
            });
        }

        let rule_set = self.services.catalog.get_rule_set(product.id).await?;
        let config_snapshot = serde_json::json!({
            "chunking": product.chunking_config,
            "playbook": self.services.playbook,
            "trust_weights": self.services.trust_weights,
            "stage_timeout_seconds": self.services.tuning.stage_timeout_seconds,
            "indexing_failure_ratio_threshold":
                self.services.tuning.indexing_failure_ratio_threshold,
            "rule_set_version": rule_set.version,
            "embedding_model": self.services.embedder.model_id(),
        });
        let reason = if request.force {
            TriggerReason::Forced
        } else {
            TriggerReason::Manual
        };
        let run = PipelineRun::new(workspace_id, product.id, version, config_snapshot, reason);
        self.services.catalog.begin_run(&run).await?;

        product.set_status(ProductStatus::Running);
        self.services.catalog.update_product(&product).await?;

        self.wake.notify_one();
        tracing::info!(
            run_id = %run.id,
            product_id = %product.id,
            version = %version,
            source = ?version_source,
            "pipeline run queued"
        );
        Ok((run, version_source))
    }

    /// Requests cooperative cancellation of a run.
    ///
    /// Fails with a conflict when the run is already terminal. The worker
    /// observes the durable flag at the next stage boundary.
    pub async fn cancel(
        &self,
        workspace_id: WorkspaceId,
        run_id: RunId,
    ) -> Result<PipelineRun, PipelineError> {
        let run = self.services.catalog.get_run(run_id).await?;
        if run.workspace_id != workspace_id {
            return Err(PipelineError::NotFound(format!("run {}", run_id)));
        }
        if run.status.is_terminal() {
            return Err(PipelineError::Conflict(format!(
                "run {} is already {}",
                run_id,
                run.status.as_str()
            )));
        }
        self.services.catalog.request_cancel(run_id).await?;
        tracing::info!(run_id = %run_id, "cancellation requested");
        self.services.catalog.get_run(run_id).await
    }

    /// Loads a run, enforcing workspace scoping.
    pub async fn get_run(
        &self,
        workspace_id: WorkspaceId,
        run_id: RunId,
    ) -> Result<PipelineRun, PipelineError> {
        let run = self.services.catalog.get_run(run_id).await?;
        if run.workspace_id != workspace_id {
            return Err(PipelineError::NotFound(format!("run {}", run_id)));
        }
        Ok(run)
    }

    /// Whether any run of the product is still active.
    pub async fn has_active_run(&self, product_id: ProductId) -> Result<bool, PipelineError> {
        let runs = self.services.catalog.list_runs(product_id).await?;
        Ok(runs.iter().any(|r| r.status == RunStatus::Queued || r.status == RunStatus::Running))
    }
}
