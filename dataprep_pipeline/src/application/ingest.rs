// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Ingest Coordinator
//!
//! Pulls raw bytes from a product's connectors, stores them in the blob
//! store, and registers them in the catalog under a newly minted version.
//!
//! ## Protocol
//!
//! 1. Quota check, then version allocation: the requested version when the
//!    caller passed one (append mode), otherwise `current_version + 1`.
//!    The catalog verifies in the same transaction that no raw file
//!    already occupies the fresh version.
//! 2. Per source, stream items with bounded fan-out. Each item derives its
//!    stable file stem from the canonical URI, registers an INGESTING row
//!    (a duplicate stem is a skip, not an error), uploads, and records
//!    size, checksum, and ETag on success or FAILED with a reason on
//!    error. A failed upload leaves the partial blob for reconciliation.
//! 3. `finalize_ingest` commits the version bump and flips the batch's
//!    INGESTING rows to INGESTED.
//!
//! At most one batch runs per product at a time: a per-product async lock
//! covers allocation through finalize, so two concurrent auto-version
//! ingests cannot claim the same fresh version and interleave their files
//! into one batch.
//!
//! Per-file failures never abort the batch; only catalog unavailability
//! does.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;

use dataprep_pipeline_domain::entities::{DataSource, RawFile, SourceType};
use dataprep_pipeline_domain::value_objects::{
    BlobLocation, Checksum, DataSourceId, ProductId, Version, WorkspaceId,
};
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog};
use dataprep_pipeline_domain::services::Quota;
use dataprep_pipeline_domain::PipelineError;

use crate::application::services::Services;
use crate::infrastructure::connectors::{
    file_stem_from_uri, Connector, DatabaseConnector, FolderConnector, SourceItem, WebConnector,
};

/// What to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub product_id: ProductId,
    /// Restrict to these sources; all of the product's sources when empty.
    pub data_source_ids: Vec<DataSourceId>,
    /// Append to an existing version instead of minting the next one.
    pub requested_version: Option<u32>,
}

/// Batch outcome counts.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestSummary {
    pub product_id: ProductId,
    pub version: u32,
    pub ingested: u64,
    pub skipped_duplicate: u64,
    pub failed: u64,
}

/// Coordinates connector pulls into versioned raw-file batches.
#[derive(Clone)]
pub struct IngestCoordinator {
    services: Arc<Services>,
    web: WebConnector,
    folder: FolderConnector,
    database: DatabaseConnector,
    /// One batch per product at a time; version allocation depends on it.
    batch_locks: Arc<parking_lot::Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>>,
}

impl IngestCoordinator {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            web: WebConnector::new(),
            folder: FolderConnector::new(),
            database: DatabaseConnector::new(),
            batch_locks: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    fn batch_lock(&self, product_id: ProductId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.batch_locks.lock();
        locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn connector(&self, source_type: SourceType) -> &dyn Connector {
        match source_type {
            SourceType::Web => &self.web,
            SourceType::Folder => &self.folder,
            SourceType::Database => &self.database,
        }
    }

    /// Runs one ingest batch for the workspace's product.
    pub async fn ingest(
        &self,
        workspace_id: WorkspaceId,
        request: IngestRequest,
    ) -> Result<IngestSummary, PipelineError> {
        let started = Instant::now();
        self.services.quota.check_ingest(workspace_id).await?;

        let product = self.services.catalog.get_product(request.product_id).await?;
        if product.workspace_id != workspace_id {
            return Err(PipelineError::NotFound(format!(
                "product {}",
                request.product_id
            )));
        }

        // Held through finalize: allocation hands out the same fresh
        // version to every caller until files land, so concurrent batches
        // on one product must not overlap.
        let lock = self.batch_lock(product.id);
        let _batch_guard = lock.lock().await;

        let version = match request.requested_version {
            Some(v) => Version::new(v)?,
            None => {
                let next = self
                    .services
                    .catalog
                    .allocate_ingest_version(product.id)
                    .await?;
                Version::new(next)?
            }
        };

        let mut sources = self.services.catalog.list_data_sources(product.id).await?;
        if !request.data_source_ids.is_empty() {
            sources.retain(|s| request.data_source_ids.contains(&s.id));
            if sources.is_empty() {
                return Err(PipelineError::NotFound(
                    "none of the selected data sources exist".into(),
                ));
            }
        }
        if sources.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "product {} has no data sources",
                product.id
            )));
        }

        let ingested = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        for source in &sources {
            let connector = self.connector(source.source_type);
            let stream = match connector.items(source).await {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(
                        source_id = %source.id,
                        error = %err,
                        "data source could not be opened"
                    );
                    failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            stream
                .for_each_concurrent(self.services.ingest_concurrency.max(1), |item| {
                    let ingested = &ingested;
                    let skipped = &skipped;
                    let failed = &failed;
                    async move {
                        match item {
                            Ok(item) => {
                                match self
                                    .ingest_item(workspace_id, product.id, source, version, item)
                                    .await
                                {
                                    Ok(ItemOutcome::Ingested) => {
                                        ingested.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Ok(ItemOutcome::SkippedDuplicate) => {
                                        skipped.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Ok(ItemOutcome::Failed) | Err(_) => {
                                        failed.fetch_add(1, Ordering::Relaxed);
                                    }
                                }
                            }
                            Err(err) => {
                                tracing::warn!(
                                    source_id = %source.id,
                                    error = %err,
                                    "source item failed to fetch"
                                );
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                })
                .await;
        }

        self.services
            .catalog
            .finalize_ingest(product.id, version)
            .await?;

        let summary = IngestSummary {
            product_id: product.id,
            version: version.get(),
            ingested: ingested.into_inner(),
            skipped_duplicate: skipped.into_inner(),
            failed: failed.into_inner(),
        };
        self.services.metrics.files_ingested(summary.ingested);
        self.services.metrics.files_failed(summary.failed);
        self.services.metrics.observe_ingest(started.elapsed());
        tracing::info!(
            product_id = %summary.product_id,
            version = summary.version,
            ingested = summary.ingested,
            skipped = summary.skipped_duplicate,
            failed = summary.failed,
            "ingest batch finished"
        );
        Ok(summary)
    }

    async fn ingest_item(
        &self,
        workspace_id: WorkspaceId,
        product_id: ProductId,
        source: &DataSource,
        version: Version,
        item: SourceItem,
    ) -> Result<ItemOutcome, PipelineError> {
        let file_stem = file_stem_from_uri(&item.uri);
        let blob = BlobLocation::raw_file(workspace_id, product_id, version, &file_stem);
        let mut file = RawFile::new_ingesting(
            workspace_id,
            product_id,
            source.id,
            version,
            &file_stem,
            &item.filename,
            &item.content_type,
            blob.clone(),
        );

        match self.services.catalog.register_raw_file(&file).await {
            Ok(()) => {}
            Err(PipelineError::DuplicateKey(_)) => return Ok(ItemOutcome::SkippedDuplicate),
            Err(e) => return Err(e),
        }

        let checksum = Checksum::of_bytes(&item.bytes);
        let size = item.bytes.len() as u64;
        match self
            .services
            .blob
            .put(&blob, item.bytes, &item.content_type)
            .await
        {
            Ok(put) => {
                file.complete_upload(size, checksum, put.etag)?;
                self.services.catalog.update_raw_file(&file).await?;
                Ok(ItemOutcome::Ingested)
            }
            Err(err) => {
                // Leave any partial blob in place; reconciliation owns it.
                file.fail(format!("upload failed: {}", err));
                self.services.catalog.update_raw_file(&file).await?;
                Ok(ItemOutcome::Failed)
            }
        }
    }
}

enum ItemOutcome {
    Ingested,
    SkippedDuplicate,
    Failed,
}
