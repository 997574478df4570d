// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Product Entity
//!
//! A product is a tenant-owned collection of data sources and the processed
//! artifacts derived from them, identified and versioned as a unit. It owns
//! its data sources, raw files, pipeline runs, and quality rule set.
//!
//! ## Invariants
//!
//! - `promoted_version` is `None` or ≤ `current_version`
//! - `current_version` is monotonically non-decreasing; it advances only
//!   through [`Product::advance_version`] during ingest finalization
//! - `status` reflects the latest pipeline run outcome
//!
//! ## Lifecycle
//!
//! Created empty (`current_version = 0`, status `DRAFT`); each successful
//! ingest advances `current_version`; each pipeline run drives `status`
//! through `RUNNING` to `READY` or `FAILED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ProductId, WorkspaceId};
use crate::PipelineError;

/// Maximum accepted length for a product name.
pub const MAX_PRODUCT_NAME_LEN: usize = 128;

/// Lifecycle status of a product, mirroring its latest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Draft,
    Running,
    Ready,
    Failed,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "DRAFT",
            ProductStatus::Running => "RUNNING",
            ProductStatus::Ready => "READY",
            ProductStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "DRAFT" => Ok(ProductStatus::Draft),
            "RUNNING" => Ok(ProductStatus::Running),
            "READY" => Ok(ProductStatus::Ready),
            "FAILED" => Ok(ProductStatus::Failed),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown product status '{}'",
                other
            ))),
        }
    }
}

/// Chunking parameters applied by the preprocess stage.
///
/// Carried on the product and snapshotted into each run's config so an
/// in-flight run is not affected by later edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Target chunk size in whitespace tokens.
    pub target_tokens: u32,
    /// Tokens of overlap carried between adjacent chunks.
    pub overlap_tokens: u32,
    /// Chunks shorter than this many characters are merged forward.
    pub min_chunk_chars: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: 320,
            overlap_tokens: 32,
            min_chunk_chars: 80,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.target_tokens == 0 {
            return Err(PipelineError::InvalidInput(
                "chunking target_tokens must be positive".into(),
            ));
        }
        if self.overlap_tokens >= self.target_tokens {
            return Err(PipelineError::InvalidInput(
                "chunking overlap_tokens must be smaller than target_tokens".into(),
            ));
        }
        Ok(())
    }
}

/// Product entity; see module docs for the invariants it maintains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub description: String,
    pub status: ProductStatus,
    /// Highest version that completed ingestion; 0 before the first ingest.
    pub current_version: u32,
    pub promoted_version: Option<u32>,
    pub chunking_config: ChunkingConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates an empty product in `DRAFT`.
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        description: impl Into<String>,
        chunking_config: ChunkingConfig,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "product name must not be empty".into(),
            ));
        }
        if name.len() > MAX_PRODUCT_NAME_LEN {
            return Err(PipelineError::InvalidInput(format!(
                "product name exceeds {} characters",
                MAX_PRODUCT_NAME_LEN
            )));
        }
        chunking_config.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: ProductId::new(),
            workspace_id,
            name,
            description: description.into(),
            status: ProductStatus::Draft,
            current_version: 0,
            promoted_version: None,
            chunking_config,
            created_at: now,
            updated_at: now,
        })
    }

    /// Advances `current_version` to at least `version`.
    ///
    /// Idempotent for versions at or below the current one; ingest
    /// finalization may replay after a retry.
    pub fn advance_version(&mut self, version: u32) {
        if version > self.current_version {
            self.current_version = version;
        }
        self.updated_at = Utc::now();
    }

    /// Marks a version as the promoted one served to consumers.
    pub fn promote(&mut self, version: u32) -> Result<(), PipelineError> {
        if version > self.current_version {
            return Err(PipelineError::InvalidInput(format!(
                "cannot promote version {} beyond current version {}",
                version, self.current_version
            )));
        }
        self.promoted_version = Some(version);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_status(&mut self, status: ProductStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product::new(
            WorkspaceId::new(),
            "handbook",
            "employee handbook corpus",
            ChunkingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_product_is_empty_draft() {
        let p = product();
        assert_eq!(p.status, ProductStatus::Draft);
        assert_eq!(p.current_version, 0);
        assert!(p.promoted_version.is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(Product::new(
            WorkspaceId::new(),
            "   ",
            "",
            ChunkingConfig::default()
        )
        .is_err());
    }

    #[test]
    fn test_version_advance_is_monotone() {
        let mut p = product();
        p.advance_version(3);
        assert_eq!(p.current_version, 3);
        p.advance_version(2);
        assert_eq!(p.current_version, 3);
    }

    #[test]
    fn test_promote_bounded_by_current_version() {
        let mut p = product();
        p.advance_version(2);
        assert!(p.promote(3).is_err());
        p.promote(2).unwrap();
        assert_eq!(p.promoted_version, Some(2));
    }

    #[test]
    fn test_chunking_overlap_must_be_smaller() {
        let bad = ChunkingConfig {
            target_tokens: 100,
            overlap_tokens: 100,
            min_chunk_chars: 10,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for s in [
            ProductStatus::Draft,
            ProductStatus::Running,
            ProductStatus::Ready,
            ProductStatus::Failed,
        ] {
            assert_eq!(ProductStatus::parse(s.as_str()).unwrap(), s);
        }
    }
}
