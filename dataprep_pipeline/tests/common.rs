// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Common Test Helpers
//!
//! Shared environment for integration tests: a tempfile-backed SQLite
//! catalog, in-memory blob store and vector index, the deterministic hash
//! embedder, and pre-wired coordinator/orchestrator/executor handles.

use std::sync::Arc;
use tokio::sync::Notify;

use dataprep_pipeline::application::{
    IngestCoordinator, IngestRequest, IngestSummary, PipelineOrchestrator, RunExecutor, Services,
    TriggerRequest, VersionSource,
};
use dataprep_pipeline::infrastructure::blob::MemoryBlobStore;
use dataprep_pipeline::infrastructure::catalog::SqliteCatalog;
use dataprep_pipeline::infrastructure::embedding::HashEmbedder;
use dataprep_pipeline::infrastructure::metrics::MetricsService;
use dataprep_pipeline::infrastructure::vector::MemoryVectorIndex;
use dataprep_pipeline_domain::entities::{
    ChunkingConfig, DataSource, PipelineRun, Product, RunStatus, SourceType,
};
use dataprep_pipeline_domain::services::UnlimitedQuota;
use dataprep_pipeline_domain::value_objects::WorkspaceId;
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

/// One fully wired test environment.
pub struct TestEnv {
    pub services: Arc<Services>,
    pub blob: MemoryBlobStore,
    pub vectors: MemoryVectorIndex,
    pub workspace_id: WorkspaceId,
    pub ingest: IngestCoordinator,
    pub orchestrator: PipelineOrchestrator,
    pub executor: RunExecutor,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dsn = format!("sqlite://{}", temp.path().display());
        drop(temp);
        let catalog = Arc::new(SqliteCatalog::connect(&dsn).await.unwrap());

        let blob = MemoryBlobStore::new();
        let vectors = MemoryVectorIndex::new();
        let services = Arc::new(Services::new(
            catalog,
            Arc::new(blob.clone()),
            Arc::new(vectors.clone()),
            Arc::new(HashEmbedder::new(32)),
            Arc::new(UnlimitedQuota),
            MetricsService::new().unwrap(),
        ));

        let workspace_id = WorkspaceId::new();
        services
            .catalog
            .ensure_workspace(workspace_id, "test")
            .await
            .unwrap();

        let wake = Arc::new(Notify::new());
        Self {
            blob,
            vectors,
            workspace_id,
            ingest: IngestCoordinator::new(services.clone()),
            orchestrator: PipelineOrchestrator::new(services.clone(), wake),
            executor: RunExecutor::new(services.clone()),
            services,
        }
    }

    /// Creates a product in this environment's workspace.
    pub async fn create_product(&self, name: &str) -> Product {
        let product = Product::new(
            self.workspace_id,
            name,
            "test corpus",
            ChunkingConfig::default(),
        )
        .unwrap();
        self.services.catalog.create_product(&product).await.unwrap();
        product
    }

    /// Attaches a FOLDER data source pointing at `path`.
    pub async fn folder_source(&self, product: &Product, path: &str) -> DataSource {
        let source = DataSource::new(
            self.workspace_id,
            product.id,
            SourceType::Folder,
            serde_json::json!({ "path": path }),
        )
        .unwrap();
        self.services
            .catalog
            .create_data_source(&source)
            .await
            .unwrap();
        source
    }

    /// Writes a small markdown corpus and returns the directory handle.
    pub async fn write_corpus(&self) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("guide.md"),
            "# Setup\nInstall the tool first. Configure the workspace next. \
             Validate the install afterwards.\n\n# Usage\nRun the prepare command. \
             Inspect the produced report. Share it with the team.",
        )
        .await
        .unwrap();
        tokio::fs::write(
            dir.path().join("faq.md"),
            "# Questions\nWhat does the trust score mean? It summarizes chunk quality. \
             How often should we re-ingest? Whenever the sources change materially.",
        )
        .await
        .unwrap();
        dir
    }

    /// Runs a full ingest of every source of the product.
    pub async fn ingest_all(&self, product: &Product) -> Result<IngestSummary, PipelineError> {
        self.ingest
            .ingest(
                self.workspace_id,
                IngestRequest {
                    product_id: product.id,
                    data_source_ids: Vec::new(),
                    requested_version: None,
                },
            )
            .await
    }

    /// Triggers a run and drives it to its terminal status on this task.
    pub async fn trigger_and_execute(
        &self,
        product: &Product,
        version: Option<u32>,
        force: bool,
    ) -> Result<(PipelineRun, VersionSource, RunStatus), PipelineError> {
        let (run, source) = self
            .orchestrator
            .trigger(
                self.workspace_id,
                TriggerRequest {
                    product_id: product.id,
                    version,
                    force,
                },
            )
            .await?;
        let claimed = self
            .services
            .catalog
            .claim_queued_run()
            .await?
            .expect("queued run should be claimable");
        assert_eq!(claimed.id, run.id);
        let terminal = self.executor.execute(claimed).await?;
        let run = self.services.catalog.get_run(run.id).await?;
        Ok((run, source, terminal))
    }
}
