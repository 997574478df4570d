// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Catalog contract tests: version allocation, raw-file uniqueness,
//! pipeline-version resolution, and the run-state invariants.

use chrono::Utc;

use dataprep_pipeline_domain::entities::{
    PipelineRun, RawFile, RunStatus, StageName, StagePatch, StageStatus, TriggerReason,
};
use dataprep_pipeline_domain::value_objects::{BlobLocation, DataSourceId, Version};
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

use crate::common::TestEnv;

fn raw_file(env: &TestEnv, product: &dataprep_pipeline_domain::entities::Product, version: u32, stem: &str) -> RawFile {
    let version = Version::new(version).unwrap();
    RawFile::new_ingesting(
        env.workspace_id,
        product.id,
        DataSourceId::new(),
        version,
        stem,
        format!("{stem}.md"),
        "text/markdown",
        BlobLocation::raw_file(env.workspace_id, product.id, version, stem),
    )
}

#[tokio::test]
async fn test_allocate_does_not_commit_bump() {
    let env = TestEnv::new().await;
    let product = env.create_product("alloc").await;

    let v1 = env.services.catalog.allocate_ingest_version(product.id).await.unwrap();
    let v2 = env.services.catalog.allocate_ingest_version(product.id).await.unwrap();
    assert_eq!(v1, 1);
    assert_eq!(v2, 1, "allocation must not advance current_version");

    env.services
        .catalog
        .finalize_ingest(product.id, Version::new(v1).unwrap())
        .await
        .unwrap();
    let stored = env.services.catalog.get_product(product.id).await.unwrap();
    assert_eq!(stored.current_version, 1);
    assert_eq!(
        env.services.catalog.allocate_ingest_version(product.id).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_allocate_refuses_occupied_version() {
    let env = TestEnv::new().await;
    let product = env.create_product("occupied").await;

    // A batch that never finalized left files on the fresh version.
    let file = raw_file(&env, &product, 1, "stranded");
    env.services.catalog.register_raw_file(&file).await.unwrap();

    match env.services.catalog.allocate_ingest_version(product.id).await {
        Err(PipelineError::DuplicateKey(_)) => {}
        other => panic!("expected DuplicateKey, got {:?}", other),
    }

    // Finalizing the stranded batch frees allocation for the next version.
    env.services
        .catalog
        .finalize_ingest(product.id, Version::first())
        .await
        .unwrap();
    assert_eq!(
        env.services.catalog.allocate_ingest_version(product.id).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_raw_file_stem_uniqueness() {
    let env = TestEnv::new().await;
    let product = env.create_product("unique").await;

    let file = raw_file(&env, &product, 1, "docs-intro");
    env.services.catalog.register_raw_file(&file).await.unwrap();

    let duplicate = raw_file(&env, &product, 1, "docs-intro");
    match env.services.catalog.register_raw_file(&duplicate).await {
        Err(PipelineError::DuplicateKey(_)) => {}
        other => panic!("expected DuplicateKey, got {:?}", other),
    }

    // Same stem under the next version is a different identity.
    let next_version = raw_file(&env, &product, 2, "docs-intro");
    env.services
        .catalog
        .register_raw_file(&next_version)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_finalize_marks_ingesting_files() {
    let env = TestEnv::new().await;
    let product = env.create_product("finalize").await;

    let file = raw_file(&env, &product, 1, "a");
    env.services.catalog.register_raw_file(&file).await.unwrap();
    env.services
        .catalog
        .finalize_ingest(product.id, Version::first())
        .await
        .unwrap();

    let files = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0].status,
        dataprep_pipeline_domain::entities::RawFileStatus::Ingested
    );
}

#[tokio::test]
async fn test_resolve_version_auto_and_explicit() {
    let env = TestEnv::new().await;
    let product = env.create_product("resolve").await;

    // No raw files at all.
    match env
        .services
        .catalog
        .resolve_pipeline_version(product.id, None)
        .await
    {
        Err(PipelineError::NoRawFiles { .. }) => {}
        other => panic!("expected NoRawFiles, got {:?}", other),
    }

    for version in [1, 2] {
        let file = raw_file(&env, &product, version, "doc");
        env.services.catalog.register_raw_file(&file).await.unwrap();
        env.services
            .catalog
            .finalize_ingest(product.id, Version::new(version).unwrap())
            .await
            .unwrap();
    }

    // Auto resolves the latest ingested version.
    let auto = env
        .services
        .catalog
        .resolve_pipeline_version(product.id, None)
        .await
        .unwrap();
    assert_eq!(auto.get(), 2);

    // Explicit hit.
    let explicit = env
        .services
        .catalog
        .resolve_pipeline_version(product.id, Some(1))
        .await
        .unwrap();
    assert_eq!(explicit.get(), 1);

    // Explicit miss carries the actionable context.
    match env
        .services
        .catalog
        .resolve_pipeline_version(product.id, Some(5))
        .await
    {
        Err(PipelineError::NoRawFilesForVersion {
            requested_version,
            latest_ingested_version,
            available_versions,
            ..
        }) => {
            assert_eq!(requested_version, 5);
            assert_eq!(latest_ingested_version, Some(2));
            assert_eq!(available_versions, vec![1, 2]);
        }
        other => panic!("expected NoRawFilesForVersion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_active_run_invariant() {
    let env = TestEnv::new().await;
    let product = env.create_product("active").await;

    let run = PipelineRun::new(
        env.workspace_id,
        product.id,
        Version::first(),
        serde_json::json!({}),
        TriggerReason::Manual,
    );
    env.services.catalog.begin_run(&run).await.unwrap();

    let second = PipelineRun::new(
        env.workspace_id,
        product.id,
        Version::first(),
        serde_json::json!({}),
        TriggerReason::Manual,
    );
    match env.services.catalog.begin_run(&second).await {
        Err(PipelineError::RunAlreadyActive { version, .. }) => assert_eq!(version, 1),
        other => panic!("expected RunAlreadyActive, got {:?}", other),
    }

    // Settling the first run frees the slot.
    env.services
        .catalog
        .transition_run(run.id, RunStatus::Queued, RunStatus::Running, Utc::now())
        .await
        .unwrap();
    env.services
        .catalog
        .transition_run(run.id, RunStatus::Running, RunStatus::Failed, Utc::now())
        .await
        .unwrap();
    env.services.catalog.begin_run(&second).await.unwrap();
}

#[tokio::test]
async fn test_transition_run_is_compare_and_set() {
    let env = TestEnv::new().await;
    let product = env.create_product("cas").await;

    let run = PipelineRun::new(
        env.workspace_id,
        product.id,
        Version::first(),
        serde_json::json!({}),
        TriggerReason::Manual,
    );
    env.services.catalog.begin_run(&run).await.unwrap();

    match env
        .services
        .catalog
        .transition_run(run.id, RunStatus::Running, RunStatus::Succeeded, Utc::now())
        .await
    {
        Err(PipelineError::Conflict(_)) => {}
        other => panic!("expected Conflict on wrong from-status, got {:?}", other),
    }

    env.services
        .catalog
        .transition_run(run.id, RunStatus::Queued, RunStatus::Running, Utc::now())
        .await
        .unwrap();
    let stored = env.services.catalog.get_run(run.id).await.unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert!(stored.started_at.is_some());
}

#[tokio::test]
async fn test_claim_queued_run_takes_oldest() {
    let env = TestEnv::new().await;
    let first_product = env.create_product("claim-a").await;
    let second_product = env.create_product("claim-b").await;

    let first = PipelineRun::new(
        env.workspace_id,
        first_product.id,
        Version::first(),
        serde_json::json!({}),
        TriggerReason::Manual,
    );
    env.services.catalog.begin_run(&first).await.unwrap();
    let second = PipelineRun::new(
        env.workspace_id,
        second_product.id,
        Version::first(),
        serde_json::json!({}),
        TriggerReason::Manual,
    );
    env.services.catalog.begin_run(&second).await.unwrap();

    let claimed = env.services.catalog.claim_queued_run().await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, RunStatus::Running);

    let claimed = env.services.catalog.claim_queued_run().await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);
    assert!(env.services.catalog.claim_queued_run().await.unwrap().is_none());
}

#[tokio::test]
async fn test_stage_upsert_merges_patches() {
    let env = TestEnv::new().await;
    let product = env.create_product("stages").await;

    let run = PipelineRun::new(
        env.workspace_id,
        product.id,
        Version::first(),
        serde_json::json!({}),
        TriggerReason::Manual,
    );
    env.services.catalog.begin_run(&run).await.unwrap();

    env.services
        .catalog
        .upsert_stage(
            run.id,
            StageName::Preprocess,
            StagePatch {
                status: Some(StageStatus::Running),
                started_at: Some(Utc::now()),
                ..StagePatch::default()
            },
        )
        .await
        .unwrap();

    let mut metrics = std::collections::BTreeMap::new();
    metrics.insert("chunk_count".to_string(), 12.0);
    env.services
        .catalog
        .upsert_stage(
            run.id,
            StageName::Preprocess,
            StagePatch {
                status: Some(StageStatus::Succeeded),
                finished_at: Some(Utc::now()),
                metrics: Some(metrics),
                ..StagePatch::default()
            },
        )
        .await
        .unwrap();

    let stages = env.services.catalog.list_stages(run.id).await.unwrap();
    assert_eq!(stages.len(), 1);
    let stage = &stages[0];
    assert_eq!(stage.status, StageStatus::Succeeded);
    assert!(stage.started_at.is_some(), "earlier patch fields survive");
    assert_eq!(stage.metrics["chunk_count"], 12.0);
}

#[tokio::test]
async fn test_rule_sets_are_versioned() {
    let env = TestEnv::new().await;
    let product = env.create_product("rules").await;

    let empty = env.services.catalog.get_rule_set(product.id).await.unwrap();
    assert_eq!(empty.version, 0);
    assert_eq!(empty.rule_count(), 0);

    let baseline =
        dataprep_pipeline_domain::entities::QualityRuleSet::baseline(product.id);
    let v1 = env.services.catalog.put_rule_set(&baseline).await.unwrap();
    let v2 = env.services.catalog.put_rule_set(&baseline).await.unwrap();
    assert_eq!((v1, v2), (1, 2));

    let effective = env.services.catalog.get_rule_set(product.id).await.unwrap();
    assert_eq!(effective.version, 2);
    assert_eq!(effective.rule_count(), baseline.rule_count());
}
