// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the hierarchical error system for the dataprep
//! pipeline domain. Every layer of the system reports failures through
//! [`PipelineError`], which categorizes them, carries stable machine-readable
//! codes, and attaches actionable context for callers.
//!
//! ## Error Architecture
//!
//! The taxonomy follows the stable kinds of the system design:
//!
//! - **Input errors**: `InvalidConfiguration`, `InvalidInput` — surfaced to
//!   the caller, never retried server-side
//! - **Lookup errors**: `NotFound`, `NoRawFiles`, `NoRawFilesForVersion`
//! - **Conflict errors**: `DuplicateKey`, `RunAlreadyActive`,
//!   `AlreadySucceeded` — uniqueness or state-machine violations
//! - **Capability denials**: `QuotaExceeded`
//! - **Infrastructure errors**: `DependencyUnavailable`, `DatabaseError`,
//!   `IoError`, `SerializationError` — transient failures are retryable at
//!   the infrastructure boundary with bounded backoff
//! - **Processing errors**: `IntegrityMismatch`, `StageFailed`, `Cancelled`,
//!   `Timeout`
//! - **System errors**: `InternalError`
//!
//! ## Propagation policy
//!
//! Inside a stage, per-item errors are aggregated into metrics and never
//! propagated; only stage-level errors become `StageFailed`. Across stages,
//! the first terminal failure stops the DAG and is preserved verbatim on the
//! run. User-visible errors carry `code()`, the display message, and a
//! `context()` object with actionable hints (for example the available
//! versions when an explicit pipeline version has no raw files).

use serde_json::json;
use thiserror::Error;

/// Domain-specific errors for the dataprep pipeline system.
///
/// Each variant represents a specific failure mode with enough context for
/// debugging and for rendering the canonical API error envelope
/// `{detail, code, context}`.
///
/// ## Design Principles
///
/// - **Specific**: one variant per failure mode
/// - **Stable codes**: [`PipelineError::code`] never changes for a variant
/// - **Actionable**: [`PipelineError::context`] carries hints the caller can
///   act on without parsing the message text
/// - **Categorized**: [`PipelineError::category`] groups variants for
///   systematic handling (HTTP mapping, retry decisions)
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("A run is already queued or running for product {product_id} version {version}")]
    RunAlreadyActive { product_id: String, version: u32 },

    #[error(
        "A successful run already exists for product {product_id} version {version}; \
         pass force=true to re-run"
    )]
    AlreadySucceeded { product_id: String, version: u32 },

    #[error("Product {product_id} has no ingested raw files")]
    NoRawFiles { product_id: String },

    #[error("Product {product_id} has no raw files for version {requested_version}")]
    NoRawFilesForVersion {
        product_id: String,
        requested_version: u32,
        latest_ingested_version: Option<u32>,
        available_versions: Vec<u32>,
    },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Integrity mismatch for {file}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Logical grouping of error variants for systematic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed request or configuration; never retried server-side.
    Input,
    /// Referenced entity absent.
    NotFound,
    /// Uniqueness or state-machine violation.
    Conflict,
    /// Billing-collaborator denial.
    Quota,
    /// Catalog/blob/vector store transient failure.
    Dependency,
    /// A stage or per-file processing failure.
    Processing,
    /// Unexpected system failure.
    System,
}

impl PipelineError {
    /// Returns the stable machine-readable code for this error.
    ///
    /// Codes are part of the wire contract and never change for a variant.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "invalid_configuration",
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::DuplicateKey(_) => "duplicate_key",
            PipelineError::Conflict(_) => "conflict",
            PipelineError::RunAlreadyActive { .. } => "run_already_active",
            PipelineError::AlreadySucceeded { .. } => "already_succeeded",
            PipelineError::NoRawFiles { .. } => "no_raw_files",
            PipelineError::NoRawFilesForVersion { .. } => "no_raw_files_for_version",
            PipelineError::QuotaExceeded(_) => "quota_exceeded",
            PipelineError::DependencyUnavailable(_) => "dependency_unavailable",
            PipelineError::IntegrityMismatch { .. } => "integrity_mismatch",
            PipelineError::StageFailed { .. } => "stage_failed",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::DatabaseError(_) => "database_error",
            PipelineError::IoError(_) => "io_error",
            PipelineError::SerializationError(_) => "serialization_error",
            PipelineError::InternalError(_) => "internal_error",
        }
    }

    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::InvalidConfiguration(_) | PipelineError::InvalidInput(_) => {
                ErrorCategory::Input
            }
            PipelineError::NotFound(_)
            | PipelineError::NoRawFiles { .. }
            | PipelineError::NoRawFilesForVersion { .. } => ErrorCategory::NotFound,
            PipelineError::DuplicateKey(_)
            | PipelineError::Conflict(_)
            | PipelineError::RunAlreadyActive { .. }
            | PipelineError::AlreadySucceeded { .. } => ErrorCategory::Conflict,
            PipelineError::QuotaExceeded(_) => ErrorCategory::Quota,
            PipelineError::DependencyUnavailable(_) | PipelineError::DatabaseError(_) => {
                ErrorCategory::Dependency
            }
            PipelineError::IntegrityMismatch { .. }
            | PipelineError::StageFailed { .. }
            | PipelineError::Cancelled(_)
            | PipelineError::Timeout(_) => ErrorCategory::Processing,
            PipelineError::IoError(_)
            | PipelineError::SerializationError(_)
            | PipelineError::InternalError(_) => ErrorCategory::System,
        }
    }

    /// Whether the operation that produced this error may be retried as-is.
    ///
    /// Only transient infrastructure conditions qualify; input, lookup, and
    /// conflict errors will fail again until the caller changes something.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::DependencyUnavailable(_)
                | PipelineError::Timeout(_)
                | PipelineError::IoError(_)
        )
    }

    /// Structured context for the API error envelope, when the variant
    /// carries hints beyond its message.
    pub fn context(&self) -> Option<serde_json::Value> {
        match self {
            PipelineError::RunAlreadyActive { product_id, version }
            | PipelineError::AlreadySucceeded { product_id, version } => Some(json!({
                "product_id": product_id,
                "version": version,
            })),
            PipelineError::NoRawFilesForVersion {
                product_id,
                requested_version,
                latest_ingested_version,
                available_versions,
            } => Some(json!({
                "product_id": product_id,
                "requested_version": requested_version,
                "latest_ingested_version": latest_ingested_version,
                "available_versions": available_versions,
            })),
            PipelineError::IntegrityMismatch {
                file,
                expected,
                actual,
            } => Some(json!({
                "file": file,
                "expected": expected,
                "actual": actual,
            })),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}
