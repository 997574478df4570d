// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ingest coordinator tests: versioned batches, blob/catalog consistency,
//! and idempotent re-ingestion.

use dataprep_pipeline::application::IngestRequest;
use dataprep_pipeline_domain::entities::RawFileStatus;
use dataprep_pipeline_domain::repositories::BlobStore;
use dataprep_pipeline_domain::value_objects::Version;
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

use crate::common::TestEnv;

#[tokio::test]
async fn test_folder_ingest_registers_files_and_blobs() {
    let env = TestEnv::new().await;
    let product = env.create_product("corpus").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    let summary = env.ingest_all(&product).await.unwrap();
    assert_eq!(summary.version, 1);
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.skipped_duplicate, 0);
    assert_eq!(summary.failed, 0);

    let stored = env.services.catalog.get_product(product.id).await.unwrap();
    assert_eq!(stored.current_version, 1);

    // Every INGESTED row has a blob whose ETag matches the registered one.
    let files = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();
    assert_eq!(files.len(), 2);
    for file in &files {
        assert_eq!(file.status, RawFileStatus::Ingested);
        assert!(file.checksum.is_some());
        let head = env.blob.head(&file.blob).await.unwrap();
        assert_eq!(Some(head.etag), file.etag);
        assert_eq!(head.size_bytes, file.size_bytes);
    }
    // Files come back ordered by filename.
    assert!(files.windows(2).all(|w| w[0].filename <= w[1].filename));
}

#[tokio::test]
async fn test_reingest_same_version_is_idempotent() {
    let env = TestEnv::new().await;
    let product = env.create_product("idempotent").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    let first = env.ingest_all(&product).await.unwrap();
    assert_eq!(first.ingested, 2);
    let before = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();

    // Appending the same items to the same version skips every one.
    let second = env
        .ingest
        .ingest(
            env.workspace_id,
            IngestRequest {
                product_id: product.id,
                data_source_ids: Vec::new(),
                requested_version: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(second.ingested, 0);
    assert_eq!(second.skipped_duplicate, 2);

    let after = env
        .services
        .catalog
        .list_raw_files(product.id, Version::first())
        .await
        .unwrap();
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.file_stem, b.file_stem);
        assert_eq!(a.checksum, b.checksum);
    }
}

#[tokio::test]
async fn test_sequential_ingests_mint_new_versions() {
    let env = TestEnv::new().await;
    let product = env.create_product("versions").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    let first = env.ingest_all(&product).await.unwrap();
    let second = env.ingest_all(&product).await.unwrap();
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 2);

    // current_version equals the highest raw-file version.
    let stored = env.services.catalog.get_product(product.id).await.unwrap();
    let versions = env
        .services
        .catalog
        .versions_with_status(product.id, &[RawFileStatus::Ingested])
        .await
        .unwrap();
    assert_eq!(stored.current_version, *versions.iter().max().unwrap());
}

#[tokio::test]
async fn test_concurrent_ingests_never_share_a_version() {
    let env = TestEnv::new().await;
    let product = env.create_product("concurrent").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    // Two auto-version batches racing on one product must serialize onto
    // distinct versions instead of merging into the same fresh one.
    let (first, second) = tokio::join!(env.ingest_all(&product), env.ingest_all(&product));
    let first = first.unwrap();
    let second = second.unwrap();

    let mut versions = [first.version, second.version];
    versions.sort_unstable();
    assert_eq!(versions, [1, 2]);

    for summary in [&first, &second] {
        assert_eq!(summary.ingested, 2);
        let files = env
            .services
            .catalog
            .list_raw_files(product.id, Version::new(summary.version).unwrap())
            .await
            .unwrap();
        assert_eq!(files.len(), 2, "each batch owns its whole version");
    }
}

#[tokio::test]
async fn test_ingest_without_sources_fails() {
    let env = TestEnv::new().await;
    let product = env.create_product("no-sources").await;
    match env.ingest_all(&product).await {
        Err(PipelineError::InvalidInput(_)) => {}
        other => panic!("expected InvalidInput, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ingest_is_workspace_scoped() {
    let env = TestEnv::new().await;
    let product = env.create_product("scoped").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    let foreign_workspace = dataprep_pipeline_domain::value_objects::WorkspaceId::new();
    match env
        .ingest
        .ingest(
            foreign_workspace,
            IngestRequest {
                product_id: product.id,
                data_source_ids: Vec::new(),
                requested_version: None,
            },
        )
        .await
    {
        Err(PipelineError::NotFound(_)) => {}
        other => panic!("expected NotFound for foreign workspace, got {:?}", other),
    }
}
