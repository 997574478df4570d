// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Worker - DAG Execution
//!
//! Workers consume the durable run queue in the catalog (claim = QUEUED →
//! RUNNING compare-and-set) and walk the fixed stage path one stage at a
//! time.
//!
//! ## Execution protocol
//!
//! For each stage in order: check the durable cancel flag, mark the stage
//! RUNNING, execute under the per-stage deadline, persist the outcome patch
//! and artifacts, then decide whether to continue. Stage outputs are
//! committed to the catalog and blob store before the next stage starts.
//!
//! ## Terminal status
//!
//! The final transition is a compare-and-set from RUNNING; if it loses a
//! race (another path already settled the run) the first observed terminal
//! status wins and the loser only logs.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use dataprep_pipeline_bootstrap::shutdown::ShutdownCoordinator;
use dataprep_pipeline_domain::entities::{
    Artifact, PipelineRun, ProductStatus, RunStatus, StageName, StagePatch, StageStatus,
};
use dataprep_pipeline_domain::services::stage::{
    CancelFlag, RunBlackboard, StageContext, StageOutcome,
};
use dataprep_pipeline_domain::value_objects::ArtifactId;
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog};
use dataprep_pipeline_domain::services::Stage;
use dataprep_pipeline_domain::PipelineError;

use crate::application::services::Services;

/// How long an idle worker sleeps before polling the queue again.
const IDLE_POLL: Duration = Duration::from_secs(2);

/// Executes one claimed run through the DAG.
#[derive(Clone)]
pub struct RunExecutor {
    services: Arc<Services>,
}

impl RunExecutor {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Drives a claimed (already RUNNING) run to a terminal status.
    pub async fn execute(&self, run: PipelineRun) -> Result<RunStatus, PipelineError> {
        let services = &self.services;
        services.metrics.run_started();

        let product = services.catalog.get_product(run.product_id).await?;
        let rule_set = services.catalog.get_rule_set(run.product_id).await?;
        let cancel = CancelFlag::new();
        let ctx = StageContext {
            run_id: run.id,
            workspace_id: run.workspace_id,
            product_id: run.product_id,
            version: run.version,
            chunking: product.chunking_config.clone(),
            playbook: services.playbook.clone(),
            rule_set,
            trust_weights: services.trust_weights,
            tuning: services.tuning.clone(),
            catalog: services.catalog.clone(),
            blob: services.blob.clone(),
            vectors: services.vectors.clone(),
            embedder: services.embedder.clone(),
            cancel: cancel.clone(),
        };
        let mut board = RunBlackboard::default();
        let stage_deadline = Duration::from_secs(ctx.tuning.stage_timeout_seconds);

        let mut terminal = RunStatus::Succeeded;
        let mut terminal_error: Option<String> = None;

        for stage in services.stages.iter() {
            let name = stage.name();

            // The durable flag is authoritative; mirror it into the
            // in-process token before entering the stage.
            let current = services.catalog.get_run(run.id).await?;
            if current.cancel_requested {
                cancel.cancel();
                services
                    .catalog
                    .upsert_stage(
                        run.id,
                        name,
                        StagePatch {
                            status: Some(StageStatus::Skipped),
                            finished_at: Some(Utc::now()),
                            ..StagePatch::default()
                        },
                    )
                    .await?;
                terminal = RunStatus::Cancelled;
                break;
            }

            services
                .catalog
                .upsert_stage(
                    run.id,
                    name,
                    StagePatch {
                        status: Some(StageStatus::Running),
                        started_at: Some(Utc::now()),
                        ..StagePatch::default()
                    },
                )
                .await?;

            let started = Instant::now();
            let result =
                tokio::time::timeout(stage_deadline, stage.execute(&ctx, &mut board)).await;
            services.metrics.observe_stage(name, started.elapsed());

            match result {
                Err(_elapsed) => {
                    services
                        .catalog
                        .upsert_stage(
                            run.id,
                            name,
                            StagePatch {
                                status: Some(StageStatus::Failed),
                                finished_at: Some(Utc::now()),
                                error_message: Some("TIMEOUT".to_string()),
                                ..StagePatch::default()
                            },
                        )
                        .await?;
                    terminal = RunStatus::Failed;
                    terminal_error = Some(format!("stage {} timed out", name));
                    break;
                }
                Ok(Err(PipelineError::Cancelled(_))) => {
                    services
                        .catalog
                        .upsert_stage(
                            run.id,
                            name,
                            StagePatch {
                                status: Some(StageStatus::Skipped),
                                finished_at: Some(Utc::now()),
                                ..StagePatch::default()
                            },
                        )
                        .await?;
                    terminal = RunStatus::Cancelled;
                    break;
                }
                Ok(Err(err)) => {
                    services
                        .catalog
                        .upsert_stage(
                            run.id,
                            name,
                            StagePatch {
                                status: Some(StageStatus::Failed),
                                finished_at: Some(Utc::now()),
                                error_message: Some(err.to_string()),
                                ..StagePatch::default()
                            },
                        )
                        .await?;
                    terminal = RunStatus::Failed;
                    terminal_error = Some(err.to_string());
                    break;
                }
                Ok(Ok(outcome)) => {
                    let failed = outcome.status == StageStatus::Failed;
                    let error = outcome.error_message.clone();
                    self.persist_outcome(&run, name, outcome).await?;
                    if failed && name.is_terminal_on_failure() {
                        terminal = RunStatus::Failed;
                        terminal_error =
                            error.or_else(|| Some(format!("stage {} failed", name)));
                        break;
                    }
                }
            }
        }

        if let Some(message) = &terminal_error {
            services.catalog.set_run_error(run.id, message).await?;
        }
        match services
            .catalog
            .transition_run(run.id, RunStatus::Running, terminal, Utc::now())
            .await
        {
            Ok(()) => {}
            Err(err) => {
                // First observed terminal status wins; losing the race is
                // expected during shutdown or concurrent settlement.
                tracing::warn!(run_id = %run.id, error = %err, "terminal transition lost");
            }
        }
        self.settle_product_status(&run, terminal).await;
        services.metrics.run_finished(terminal.as_str());
        tracing::info!(
            run_id = %run.id,
            product_id = %run.product_id,
            version = %run.version,
            status = terminal.as_str(),
            "pipeline run finished"
        );
        Ok(terminal)
    }

    /// Writes a stage's patch, blob artifacts, and catalog artifact rows.
    async fn persist_outcome(
        &self,
        run: &PipelineRun,
        stage: StageName,
        outcome: StageOutcome,
    ) -> Result<(), PipelineError> {
        if stage == StageName::Preprocess {
            if let Some(count) = outcome.metrics.get("chunk_count") {
                self.services.metrics.chunks_produced(*count as u64);
            }
        }
        if stage == StageName::Indexing {
            if let Some(count) = outcome.metrics.get("embedded_count") {
                self.services.metrics.vectors_written(*count as u64);
            }
        }
        self.services
            .catalog
            .upsert_stage(
                run.id,
                stage,
                StagePatch {
                    status: Some(outcome.status),
                    finished_at: Some(Utc::now()),
                    metrics: Some(outcome.metrics),
                    error_message: outcome.error_message,
                    ..StagePatch::default()
                },
            )
            .await?;

        for draft in outcome.artifacts {
            let content_type = draft.artifact_type.content_type();
            let put = self
                .services
                .blob
                .put(&draft.blob, draft.bytes.clone(), content_type)
                .await?;
            let artifact = Artifact {
                id: ArtifactId::new(),
                run_id: run.id,
                stage_name: stage,
                artifact_type: draft.artifact_type,
                name: draft.name,
                display_name: draft.display_name,
                blob: draft.blob,
                size_bytes: put.size_bytes,
                created_at: Utc::now(),
            };
            self.services.catalog.insert_artifact(&artifact).await?;
        }
        Ok(())
    }

    /// Reflects the run's terminal status onto the product.
    async fn settle_product_status(&self, run: &PipelineRun, terminal: RunStatus) {
        let status = match terminal {
            // Finalize already moved the product to READY on success.
            RunStatus::Succeeded => return,
            RunStatus::Failed => ProductStatus::Failed,
            RunStatus::Cancelled => {
                match self.services.catalog.latest_succeeded_run(run.product_id).await {
                    Ok(Some(_)) => ProductStatus::Ready,
                    _ => ProductStatus::Draft,
                }
            }
            _ => return,
        };
        if let Ok(mut product) = self.services.catalog.get_product(run.product_id).await {
            product.set_status(status);
            if let Err(err) = self.services.catalog.update_product(&product).await {
                tracing::warn!(error = %err, "could not settle product status");
            }
        }
    }
}

/// The worker pool consuming the durable run queue.
pub struct RunWorkerPool {
    services: Arc<Services>,
    workers: usize,
    wake: Arc<Notify>,
}

impl RunWorkerPool {
    pub fn new(services: Arc<Services>, workers: usize, wake: Arc<Notify>) -> Self {
        Self {
            services,
            workers: workers.max(1),
            wake,
        }
    }

    /// Spawns the worker tasks; they run until the coordinator shuts down.
    pub fn spawn(self, shutdown: &ShutdownCoordinator) {
        for worker_id in 0..self.workers {
            let services = self.services.clone();
            let wake = self.wake.clone();
            let token = shutdown.token();
            let guard = shutdown.register();
            tokio::spawn(async move {
                let _guard = guard;
                let executor = RunExecutor::new(services.clone());
                tracing::debug!(worker_id, "pipeline worker started");
                loop {
                    if token.is_cancelled() {
                        break;
                    }
                    match services.catalog.claim_queued_run().await {
                        Ok(Some(run)) => {
                            let run_id = run.id;
                            if let Err(err) = executor.execute(run).await {
                                tracing::error!(
                                    worker_id,
                                    run_id = %run_id,
                                    error = %err,
                                    "run execution aborted"
                                );
                            }
                        }
                        Ok(None) => {
                            tokio::select! {
                                _ = wake.notified() => {}
                                _ = tokio::time::sleep(IDLE_POLL) => {}
                                _ = token.cancelled() => break,
                            }
                        }
                        Err(err) => {
                            tracing::warn!(worker_id, error = %err, "queue poll failed");
                            tokio::select! {
                                _ = tokio::time::sleep(IDLE_POLL) => {}
                                _ = token.cancelled() => break,
                            }
                        }
                    }
                }
                tracing::debug!(worker_id, "pipeline worker stopped");
            });
        }
    }
}
