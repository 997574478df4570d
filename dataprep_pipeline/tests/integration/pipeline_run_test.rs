// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end pipeline run tests: version resolution, the full DAG happy
//! path, partial-failure semantics, cancellation, and timeouts.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

use dataprep_pipeline::application::{
    reconcile, PipelineOrchestrator, RunExecutor, Services, TriggerRequest, VersionSource,
};
use dataprep_pipeline_domain::entities::{
    ProductStatus, RawFileStatus, RunStatus, StageName, StageStatus,
};
use dataprep_pipeline_domain::repositories::{Catalog, VectorIndex};
use dataprep_pipeline_domain::services::{
    Embedder, RunBlackboard, Stage, StageContext, StageOutcome,
};
use dataprep_pipeline_domain::value_objects::Version;
use dataprep_pipeline_domain::PipelineError;

use crate::common::TestEnv;

#[tokio::test]
async fn test_auto_resolve_runs_latest_ingested_version() {
    let env = TestEnv::new().await;
    let product = env.create_product("auto").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    // Two ingests; the trigger with no version must pick the newest.
    env.ingest_all(&product).await.unwrap();
    let summary = env.ingest_all(&product).await.unwrap();
    assert_eq!(summary.version, 2);

    let (run, source, terminal) = env.trigger_and_execute(&product, None, false).await.unwrap();
    assert_eq!(source, VersionSource::Auto);
    assert_eq!(run.version.get(), 2);
    assert_eq!(terminal, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_successful_run_settles_everything() {
    let env = TestEnv::new().await;
    let product = env.create_product("happy").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let (run, _, terminal) = env.trigger_and_execute(&product, None, false).await.unwrap();
    assert_eq!(terminal, RunStatus::Succeeded);
    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.finished_at.is_some());

    // Every stage of the DAG reached a terminal stage status.
    let stages = env.services.catalog.list_stages(run.id).await.unwrap();
    assert_eq!(stages.len(), StageName::DAG.len());
    for stage in &stages {
        assert_eq!(
            stage.status,
            StageStatus::Succeeded,
            "stage {} should succeed",
            stage.stage_name
        );
        assert!(stage.finished_at.is_some());
    }

    // Artifacts from every producing stage.
    let artifacts = env.services.catalog.list_artifacts(run.id).await.unwrap();
    let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
    for expected in [
        "chunks.jsonl",
        "fingerprint.json",
        "policy.json",
        "report.csv",
        "report.pdf",
        "vectors.bin",
        "summary.json",
    ] {
        assert!(names.contains(&expected), "missing artifact {}", expected);
    }

    // Raw files settled, product promoted.
    let files = env
        .services
        .catalog
        .list_raw_files(product.id, run.version)
        .await
        .unwrap();
    assert!(files.iter().all(|f| f.status == RawFileStatus::Processed));
    let stored = env.services.catalog.get_product(product.id).await.unwrap();
    assert_eq!(stored.status, ProductStatus::Ready);
    assert_eq!(stored.promoted_version, Some(run.version.get()));

    // The vector store holds one point per chunk record.
    let records = env
        .services
        .catalog
        .query_chunk_records(&dataprep_pipeline_domain::repositories::ChunkQuery {
            product_id: product.id,
            version: run.version,
            section: None,
            field_name: None,
            limit: 500,
            offset: 0,
        })
        .await
        .unwrap();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.score.is_some()), "scores folded back");
    let stored_vectors = env
        .vectors
        .count(product.id, run.version)
        .await
        .unwrap();
    assert_eq!(stored_vectors, records.len() as u64);
}

#[tokio::test]
async fn test_explicit_version_miss_reports_available_versions() {
    let env = TestEnv::new().await;
    let product = env.create_product("miss").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    match env.trigger_and_execute(&product, Some(5), false).await {
        Err(PipelineError::NoRawFilesForVersion {
            requested_version,
            available_versions,
            latest_ingested_version,
            ..
        }) => {
            assert_eq!(requested_version, 5);
            assert_eq!(available_versions, vec![1]);
            assert_eq!(latest_ingested_version, Some(1));
        }
        other => panic!("expected NoRawFilesForVersion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_trigger_without_data_fails() {
    let env = TestEnv::new().await;
    let product = env.create_product("empty").await;
    match env.trigger_and_execute(&product, None, false).await {
        Err(PipelineError::NoRawFiles { .. }) => {}
        other => panic!("expected NoRawFiles, got {:?}", other),
    }
}

#[tokio::test]
async fn test_double_trigger_conflicts() {
    let env = TestEnv::new().await;
    let product = env.create_product("double").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let (first, _) = env
        .orchestrator
        .trigger(
            env.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: None,
                force: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Queued);

    match env
        .orchestrator
        .trigger(
            env.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: None,
                force: false,
            },
        )
        .await
    {
        Err(PipelineError::RunAlreadyActive { .. }) => {}
        other => panic!("expected RunAlreadyActive, got {:?}", other),
    }

    // The first run is still the only one.
    let runs = env.services.catalog.list_runs(product.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, first.id);
}

#[tokio::test]
async fn test_succeeded_version_requires_force() {
    let env = TestEnv::new().await;
    let product = env.create_product("force").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let (first, _, terminal) = env.trigger_and_execute(&product, None, false).await.unwrap();
    assert_eq!(terminal, RunStatus::Succeeded);

    match env.trigger_and_execute(&product, Some(1), false).await {
        Err(PipelineError::AlreadySucceeded { version, .. }) => assert_eq!(version, 1),
        other => panic!("expected AlreadySucceeded, got {:?}", other),
    }

    // Forcing mints a fresh run id and re-runs the version.
    let (second, _, terminal) = env
        .trigger_and_execute(&product, Some(1), true)
        .await
        .unwrap();
    assert_eq!(terminal, RunStatus::Succeeded);
    assert_ne!(first.id, second.id);
}

/// Embedder that fails every batch, for exercising the failure threshold.
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        Err(PipelineError::DependencyUnavailable(
            "embedding provider down".into(),
        ))
    }

    fn dimension(&self) -> usize {
        32
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

fn rewire(services: Services) -> (Arc<Services>, PipelineOrchestrator, RunExecutor) {
    let services = Arc::new(services);
    let wake = Arc::new(Notify::new());
    let orchestrator = PipelineOrchestrator::new(services.clone(), wake);
    let executor = RunExecutor::new(services.clone());
    (services, orchestrator, executor)
}

#[tokio::test]
async fn test_embedding_failures_above_threshold_fail_the_run() {
    let env = TestEnv::new().await;
    let product = env.create_product("threshold").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let mut services = (*env.services).clone();
    services.embedder = Arc::new(FailingEmbedder);
    let (services, orchestrator, executor) = rewire(services);

    let (run, _) = orchestrator
        .trigger(
            env.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: None,
                force: false,
            },
        )
        .await
        .unwrap();
    let claimed = services.catalog.claim_queued_run().await.unwrap().unwrap();
    let terminal = executor.execute(claimed).await.unwrap();
    assert_eq!(terminal, RunStatus::Failed);

    let stages = services.catalog.list_stages(run.id).await.unwrap();
    let by_name = |name: StageName| stages.iter().find(|s| s.stage_name == name);

    let indexing = by_name(StageName::Indexing).expect("indexing ran");
    assert_eq!(indexing.status, StageStatus::Failed);
    assert!(indexing.metrics["failure_ratio"] > 0.05);

    // Later stages never reached a success.
    for name in [StageName::ValidateQuality, StageName::Finalize] {
        if let Some(stage) = by_name(name) {
            assert_ne!(stage.status, StageStatus::Succeeded);
        }
    }
    let run = services.catalog.get_run(run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.is_some());
}

#[tokio::test]
async fn test_cancel_before_execution_skips_all_stages() {
    let env = TestEnv::new().await;
    let product = env.create_product("cancel-early").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let (run, _) = env
        .orchestrator
        .trigger(
            env.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: None,
                force: false,
            },
        )
        .await
        .unwrap();
    let claimed = env.services.catalog.claim_queued_run().await.unwrap().unwrap();
    env.orchestrator
        .cancel(env.workspace_id, run.id)
        .await
        .unwrap();

    let terminal = env.executor.execute(claimed).await.unwrap();
    assert_eq!(terminal, RunStatus::Cancelled);

    let stages = env.services.catalog.list_stages(run.id).await.unwrap();
    assert!(stages.iter().all(|s| s.status != StageStatus::Succeeded));
    assert!(stages
        .iter()
        .any(|s| s.status == StageStatus::Skipped));
}

/// Stage that flips the durable cancel flag mid-run, standing in for an
/// operator cancelling while the DAG is executing.
struct CancelInjector {
    catalog: Arc<dyn Catalog>,
}

#[async_trait]
impl Stage for CancelInjector {
    fn name(&self) -> StageName {
        StageName::Scoring
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        _board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        self.catalog.request_cancel(ctx.run_id).await?;
        Ok(StageOutcome::succeeded())
    }
}

#[tokio::test]
async fn test_cancel_mid_run_stops_at_next_boundary() {
    let env = TestEnv::new().await;
    let product = env.create_product("cancel-mid").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let mut services = (*env.services).clone();
    services.stages = Arc::new(vec![
        Arc::new(dataprep_pipeline::infrastructure::stages::PreprocessStage) as Arc<dyn Stage>,
        Arc::new(CancelInjector {
            catalog: services.catalog.clone(),
        }),
        Arc::new(dataprep_pipeline::infrastructure::stages::FingerprintStage),
        Arc::new(dataprep_pipeline::infrastructure::stages::FinalizeStage),
    ]);
    let (services, orchestrator, executor) = rewire(services);

    let (run, _) = orchestrator
        .trigger(
            env.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: None,
                force: false,
            },
        )
        .await
        .unwrap();
    let claimed = services.catalog.claim_queued_run().await.unwrap().unwrap();
    let terminal = executor.execute(claimed).await.unwrap();
    assert_eq!(terminal, RunStatus::Cancelled);

    let stages = services.catalog.list_stages(run.id).await.unwrap();
    let scoring = stages
        .iter()
        .find(|s| s.stage_name == StageName::Scoring)
        .unwrap();
    // The flag was set during scoring; scoring itself may finish, but
    // nothing started after it may succeed.
    let after_scoring: Vec<_> = stages
        .iter()
        .filter(|s| {
            matches!(s.stage_name, StageName::Fingerprint | StageName::Finalize)
        })
        .collect();
    assert!(!after_scoring.is_empty());
    assert!(after_scoring.iter().all(|s| s.status == StageStatus::Skipped));
    assert_ne!(scoring.status, StageStatus::Running);
}

#[tokio::test]
async fn test_integrity_mismatch_drops_file_without_failing_run() {
    let env = TestEnv::new().await;
    let product = env.create_product("integrity").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    // Remove one blob behind the catalog's back.
    let files = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();
    env.blob.corrupt(&files[0].blob);

    let (run, _, terminal) = env.trigger_and_execute(&product, None, false).await.unwrap();
    assert_eq!(terminal, RunStatus::Succeeded, "one healthy file is enough");

    let stages = env.services.catalog.list_stages(run.id).await.unwrap();
    let preprocess = stages
        .iter()
        .find(|s| s.stage_name == StageName::Preprocess)
        .unwrap();
    assert_eq!(preprocess.metrics["files_integrity_failed_count"], 1.0);

    let files = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();
    let failed: Vec<_> = files
        .iter()
        .filter(|f| f.status == RawFileStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error_message.is_some());
}

/// Stage that outlives any reasonable deadline.
struct StallStage;

#[async_trait]
impl Stage for StallStage {
    fn name(&self) -> StageName {
        StageName::Preprocess
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        _board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        Ok(StageOutcome::succeeded())
    }
}

#[tokio::test]
async fn test_stage_deadline_marks_timeout() {
    let env = TestEnv::new().await;
    let product = env.create_product("deadline").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let mut services = (*env.services).clone();
    services.stages = Arc::new(vec![Arc::new(StallStage) as Arc<dyn Stage>]);
    services.tuning.stage_timeout_seconds = 1;
    let (services, orchestrator, executor) = rewire(services);

    let (run, _) = orchestrator
        .trigger(
            env.workspace_id,
            TriggerRequest {
                product_id: product.id,
                version: None,
                force: false,
            },
        )
        .await
        .unwrap();
    let claimed = services.catalog.claim_queued_run().await.unwrap().unwrap();
    let terminal = executor.execute(claimed).await.unwrap();
    assert_eq!(terminal, RunStatus::Failed);

    let stages = services.catalog.list_stages(run.id).await.unwrap();
    assert_eq!(stages[0].status, StageStatus::Failed);
    assert_eq!(stages[0].error_message.as_deref(), Some("TIMEOUT"));
}

#[tokio::test]
async fn test_reconcile_repairs_drifted_files() {
    let env = TestEnv::new().await;
    let product = env.create_product("reconcile").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let files = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();
    env.blob.corrupt(&files[0].blob);

    let report = reconcile::reconcile(
        &env.services,
        env.workspace_id,
        product.id,
        Version::first(),
    )
    .await
    .unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.missing_blob, 1);
    assert_eq!(report.healthy, 1);

    let repaired = env.services.catalog.get_raw_file(files[0].id).await.unwrap();
    assert_eq!(repaired.status, RawFileStatus::Failed);
}
