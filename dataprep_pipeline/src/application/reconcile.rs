// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Raw-File Reconciliation
//!
//! Walks a version's catalog rows against the blob store and repairs the
//! referential invariant: a row claiming INGESTED/PROCESSED bytes must have
//! a blob with a matching ETag. Rows whose blob is missing or drifted are
//! marked FAILED (the blob store holds the truth about bytes); rows stuck
//! in INGESTING past the cutoff are closed out as failed uploads.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;

use dataprep_pipeline_domain::entities::RawFileStatus;
use dataprep_pipeline_domain::value_objects::{ProductId, Version, WorkspaceId};
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog};
use dataprep_pipeline_domain::PipelineError;

use crate::application::services::Services;

/// An INGESTING row older than this is a dead upload.
const STUCK_INGESTING_MINUTES: i64 = 60;

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub checked: u64,
    pub healthy: u64,
    pub missing_blob: u64,
    pub etag_mismatch: u64,
    pub stuck_ingesting: u64,
}

/// Reconciles one product version's raw files against the blob store.
pub async fn reconcile(
    services: &Arc<Services>,
    workspace_id: WorkspaceId,
    product_id: ProductId,
    version: Version,
) -> Result<ReconcileReport, PipelineError> {
    let product = services.catalog.get_product(product_id).await?;
    if product.workspace_id != workspace_id {
        return Err(PipelineError::NotFound(format!("product {}", product_id)));
    }

    let files = services.catalog.list_raw_files(product_id, version).await?;
    let mut report = ReconcileReport::default();
    let stuck_cutoff = Utc::now() - ChronoDuration::minutes(STUCK_INGESTING_MINUTES);

    for mut file in files {
        report.checked += 1;
        match file.status {
            RawFileStatus::Ingesting => {
                if file.ingested_at < stuck_cutoff {
                    report.stuck_ingesting += 1;
                    file.fail("upload never completed");
                    services.catalog.update_raw_file(&file).await?;
                    services.metrics.files_failed(1);
                } else {
                    report.healthy += 1;
                }
            }
            RawFileStatus::Ingested | RawFileStatus::Processing | RawFileStatus::Processed => {
                match services.blob.head(&file.blob).await {
                    Ok(head) => {
                        let drifted = file
                            .etag
                            .as_deref()
                            .map(|expected| expected != head.etag)
                            .unwrap_or(false);
                        if drifted {
                            report.etag_mismatch += 1;
                            file.fail("blob etag drifted from registered value");
                            services.catalog.update_raw_file(&file).await?;
                            services.metrics.files_failed(1);
                        } else {
                            report.healthy += 1;
                        }
                    }
                    Err(PipelineError::NotFound(_)) => {
                        report.missing_blob += 1;
                        file.fail("blob missing from object store");
                        services.catalog.update_raw_file(&file).await?;
                        services.metrics.files_failed(1);
                    }
                    Err(e) => return Err(e),
                }
            }
            RawFileStatus::Failed | RawFileStatus::Deleted => {
                report.healthy += 1;
            }
        }
    }

    tracing::info!(
        product_id = %product_id,
        version = %version,
        checked = report.checked,
        missing = report.missing_blob,
        drifted = report.etag_mismatch,
        stuck = report.stuck_ingesting,
        "reconciliation pass finished"
    );
    Ok(report)
}
