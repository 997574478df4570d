// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Raw File Entity and Lifecycle State Machine
//!
//! One ingested source item, stored once in the blob store and once as a
//! catalog row. The row is the source of truth for which bytes a pipeline
//! run operates on.
//!
//! ## Invariants
//!
//! - `(product_id, version, file_stem)` is unique among non-deleted rows
//! - every row in INGESTED/PROCESSING/PROCESSED has a blob at
//!   `(blob_bucket, blob_key)` whose ETag matches `etag`
//!
//! ## Lifecycle
//!
//! ```text
//! INGESTING ──► INGESTED ──► PROCESSING ──► PROCESSED
//!     │             │             │
//!     └─────────────┴─────────────┴──► FAILED
//! any ──► DELETED (soft tombstone, retained for audit)
//! ```
//!
//! Transitions are validated by [`RawFileStatus::can_transition_to`]; the
//! catalog rejects writes that would skip a state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{
    BlobLocation, Checksum, DataSourceId, ProductId, RawFileId, Version, WorkspaceId,
};
use crate::PipelineError;

/// Lifecycle status of a raw file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawFileStatus {
    Ingesting,
    Ingested,
    Processing,
    Processed,
    Failed,
    Deleted,
}

impl RawFileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawFileStatus::Ingesting => "INGESTING",
            RawFileStatus::Ingested => "INGESTED",
            RawFileStatus::Processing => "PROCESSING",
            RawFileStatus::Processed => "PROCESSED",
            RawFileStatus::Failed => "FAILED",
            RawFileStatus::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "INGESTING" => Ok(RawFileStatus::Ingesting),
            "INGESTED" => Ok(RawFileStatus::Ingested),
            "PROCESSING" => Ok(RawFileStatus::Processing),
            "PROCESSED" => Ok(RawFileStatus::Processed),
            "FAILED" => Ok(RawFileStatus::Failed),
            "DELETED" => Ok(RawFileStatus::Deleted),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown raw file status '{}'",
                other
            ))),
        }
    }

    /// Whether a transition to `next` is admitted by the state machine.
    pub fn can_transition_to(self, next: RawFileStatus) -> bool {
        use RawFileStatus::*;
        match (self, next) {
            (Ingesting, Ingested) => true,
            (Ingested, Processing) => true,
            (Processing, Processed) => true,
            // Re-processing a version walks PROCESSED files through
            // PROCESSING again.
            (Processed, Processing) => true,
            (_, Failed) => self != Deleted,
            (_, Deleted) => true,
            // Ingest retries may re-assert INGESTED on a failed upload.
            (Failed, Ingested) => true,
            _ => false,
        }
    }
}

/// Catalog row for one ingested source item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFile {
    pub id: RawFileId,
    pub workspace_id: WorkspaceId,
    pub product_id: ProductId,
    pub data_source_id: Option<DataSourceId>,
    pub version: Version,
    /// Stable, URI-derived identity of the item within its version; the
    /// dedup key across repeated ingests.
    pub file_stem: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub checksum: Option<Checksum>,
    pub blob: BlobLocation,
    pub etag: Option<String>,
    pub status: RawFileStatus,
    pub error_message: Option<String>,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RawFile {
    /// Creates the provisional row registered before bytes are uploaded.
    #[allow(clippy::too_many_arguments)]
    pub fn new_ingesting(
        workspace_id: WorkspaceId,
        product_id: ProductId,
        data_source_id: DataSourceId,
        version: Version,
        file_stem: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        blob: BlobLocation,
    ) -> Self {
        Self {
            id: RawFileId::new(),
            workspace_id,
            product_id,
            data_source_id: Some(data_source_id),
            version,
            file_stem: file_stem.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            size_bytes: 0,
            checksum: None,
            blob,
            etag: None,
            status: RawFileStatus::Ingesting,
            error_message: None,
            ingested_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Records a completed upload: size, checksum, ETag, INGESTED.
    pub fn complete_upload(
        &mut self,
        size_bytes: u64,
        checksum: Checksum,
        etag: String,
    ) -> Result<(), PipelineError> {
        self.transition(RawFileStatus::Ingested)?;
        self.size_bytes = size_bytes;
        self.checksum = Some(checksum);
        self.etag = Some(etag);
        Ok(())
    }

    /// Marks the file failed with a reason, from any live state.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status != RawFileStatus::Deleted {
            self.status = RawFileStatus::Failed;
            self.error_message = Some(message.into());
        }
    }

    /// Validated status transition.
    pub fn transition(&mut self, next: RawFileStatus) -> Result<(), PipelineError> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidInput(format!(
                "raw file {} cannot move {} -> {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        if next == RawFileStatus::Processed {
            self.processed_at = Some(Utc::now());
        }
        Ok(())
    }
}
