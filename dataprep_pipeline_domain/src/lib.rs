// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataprep Pipeline Domain
//!
//! The domain layer of the dataprep pipeline: the business objects and rules
//! for versioned document products, raw-file lifecycle, staged preparation
//! runs, and the quality/insight model. It is completely independent of
//! external concerns like databases, object stores, or HTTP surfaces.
//!
//! ## Module Structure
//!
//! - [`entities`] — objects with identity and lifecycle: `Product`,
//!   `DataSource`, `RawFile`, `PipelineRun`, `StageExecution`, `Artifact`,
//!   quality rules and violations
//! - [`value_objects`] — immutable, self-validating values: typed ULID
//!   identifiers, `Version`, `BlobLocation`, `Checksum`, `Chunk`,
//!   `ReadinessFingerprint`
//! - [`repositories`] — persistence seams: [`repositories::Catalog`],
//!   [`repositories::BlobStore`], [`repositories::VectorIndex`]
//! - [`services`] — the stage contract ([`services::Stage`],
//!   [`services::StageContext`], [`services::RunBlackboard`]) and narrow
//!   collaborator seams ([`services::Embedder`], [`services::Quota`])
//! - [`error`] — the [`PipelineError`] taxonomy shared by every layer
//!
//! ## Core invariants enforced here
//!
//! - `(product_id, version, file_stem)` uniquely identifies a raw file
//! - At most one QUEUED/RUNNING run and at most one SUCCEEDED run per
//!   `(product_id, version)`
//! - `promoted_version` never exceeds `current_version`
//! - Raw-file status transitions follow the lifecycle state machine
//! - Every ratio persisted as a metric is on a 0–1 scale
//!
//! The domain layer defines *what* must hold; the infrastructure layer in the
//! `dataprep-pipeline` crate decides *how* (SQLite transactions, S3 objects,
//! HTTP handlers).

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::PipelineError;

// Common value objects and entities, re-exported for ergonomic paths.
pub use entities::{
    Artifact, ArtifactType, ChunkRecord, DataSource, PipelineRun, Product, ProductStatus,
    QualityRule, QualityRuleSet, QualityViolation, RawFile, RawFileStatus, RunStatus, Severity,
    SourceType, StageExecution, StageName, StageStatus,
};
pub use value_objects::{
    ArtifactId, BlobBucket, BlobLocation, Checksum, Chunk, ChunkScores, DataSourceId, ProductId,
    RawFileId, ReadinessFingerprint, RunId, Version, WorkspaceId,
};
