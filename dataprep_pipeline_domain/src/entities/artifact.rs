// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact and Chunk Record Entities
//!
//! Artifacts are the durable outputs a stage leaves behind (fingerprint
//! JSON, policy report, CSV/PDF summaries, packed vectors); chunk records
//! are the denormalized per-chunk index rows backing drill-down queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::pipeline_run::StageName;
use crate::value_objects::{ArtifactId, BlobLocation, ChunkId, ProductId, RunId, Version};
use crate::PipelineError;

/// Format of a persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    Json,
    Jsonl,
    Csv,
    Pdf,
    Vector,
    Report,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Json => "JSON",
            ArtifactType::Jsonl => "JSONL",
            ArtifactType::Csv => "CSV",
            ArtifactType::Pdf => "PDF",
            ArtifactType::Vector => "VECTOR",
            ArtifactType::Report => "REPORT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "JSON" => Ok(ArtifactType::Json),
            "JSONL" => Ok(ArtifactType::Jsonl),
            "CSV" => Ok(ArtifactType::Csv),
            "PDF" => Ok(ArtifactType::Pdf),
            "VECTOR" => Ok(ArtifactType::Vector),
            "REPORT" => Ok(ArtifactType::Report),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown artifact type '{}'",
                other
            ))),
        }
    }

    /// MIME type served when the artifact is downloaded inline.
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactType::Json | ArtifactType::Report => "application/json",
            ArtifactType::Jsonl => "application/x-ndjson",
            ArtifactType::Csv => "text/csv",
            ArtifactType::Pdf => "application/pdf",
            ArtifactType::Vector => "application/octet-stream",
        }
    }
}

/// Catalog row for one stage output object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub stage_name: StageName,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub display_name: Option<String>,
    pub blob: BlobLocation,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// An artifact a stage wants persisted: bytes plus catalog metadata.
///
/// The orchestrator owns the write so stage code never touches the catalog
/// directly for artifact bookkeeping.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub artifact_type: ArtifactType,
    pub name: String,
    pub display_name: Option<String>,
    pub blob: BlobLocation,
    pub bytes: bytes::Bytes,
}

/// Denormalized per-chunk index row for drill-down queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub product_id: ProductId,
    pub version: Version,
    pub chunk_id: ChunkId,
    pub source_file: String,
    pub page_number: Option<u32>,
    pub section: Option<String>,
    pub field_name: Option<String>,
    /// Composite chunk score on the 0-1 scale, once scoring has run.
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_type_round_trip() {
        for t in [
            ArtifactType::Json,
            ArtifactType::Jsonl,
            ArtifactType::Csv,
            ArtifactType::Pdf,
            ArtifactType::Vector,
            ArtifactType::Report,
        ] {
            assert_eq!(ArtifactType::parse(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ArtifactType::Csv.content_type(), "text/csv");
        assert_eq!(
            ArtifactType::Vector.content_type(),
            "application/octet-stream"
        );
    }
}
