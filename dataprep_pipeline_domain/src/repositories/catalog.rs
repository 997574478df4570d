// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Catalog Repository Interface
//!
//! The transactional store of products, data sources, raw files, pipeline
//! runs, stage executions, artifacts, chunk records, and quality rules. The
//! catalog is the single source of truth for versions: the version
//! coordination contract between ingestion and processing lives entirely
//! behind this trait.
//!
//! ## Contract highlights
//!
//! - `allocate_ingest_version` reads `current_version + 1` without
//!   committing the bump; only `finalize_ingest` advances the product
//! - `register_raw_file` enforces `(product, version, file_stem)` uniqueness
//!   and fails with `DuplicateKey`
//! - `begin_run` enforces the single-active-run invariant and fails with
//!   `RunAlreadyActive`
//! - `transition_run` is compare-and-set: the stored status must equal the
//!   expected `from` status or the call fails with a conflict
//! - all multi-row transitions run inside one transaction on the
//!   implementation side
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; handlers, the ingest coordinator,
//! and every pipeline worker share one instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    Artifact, ChunkRecord, DataSource, PipelineRun, Product, QualityRuleSet, QualityViolation,
    RawFile, RawFileStatus, RunStatus, StageExecution, StageName, StagePatch,
};
use crate::value_objects::{
    ArtifactId, DataSourceId, ProductId, RawFileId, RunId, Version, WorkspaceId,
};
use crate::PipelineError;

/// Filter for chunk-record queries; all fields optional except the pair
/// that scopes the query.
#[derive(Debug, Clone)]
pub struct ChunkQuery {
    pub product_id: ProductId,
    pub version: Version,
    pub section: Option<String>,
    pub field_name: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// Maximum page size for chunk-record queries.
pub const MAX_CHUNK_PAGE: u32 = 500;

#[async_trait]
pub trait Catalog: Send + Sync {
    // ------------------------------------------------------------------
    // Workspaces
    // ------------------------------------------------------------------

    /// Inserts the workspace row if it does not exist yet.
    async fn ensure_workspace(
        &self,
        id: WorkspaceId,
        name: &str,
    ) -> Result<(), PipelineError>;

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    /// Inserts a product; fails `DuplicateKey` on a name conflict within
    /// the workspace.
    async fn create_product(&self, product: &Product) -> Result<(), PipelineError>;

    async fn get_product(&self, id: ProductId) -> Result<Product, PipelineError>;

    async fn list_products(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<Product>, PipelineError>;

    async fn update_product(&self, product: &Product) -> Result<(), PipelineError>;

    /// Cascade-deletes a product and everything it owns; fails
    /// `RunAlreadyActive` while a run is queued or running.
    async fn delete_product(&self, id: ProductId) -> Result<(), PipelineError>;

    // ------------------------------------------------------------------
    // Data sources
    // ------------------------------------------------------------------

    async fn create_data_source(&self, source: &DataSource) -> Result<(), PipelineError>;

    async fn get_data_source(&self, id: DataSourceId) -> Result<DataSource, PipelineError>;

    async fn list_data_sources(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<DataSource>, PipelineError>;

    // ------------------------------------------------------------------
    // Versions & raw files
    // ------------------------------------------------------------------

    /// Returns `current_version + 1` without committing the bump.
    ///
    /// The read and the check that no raw file already occupies the fresh
    /// version happen in one transaction; an occupied version fails with
    /// `DuplicateKey` (append to it with an explicit version instead).
    async fn allocate_ingest_version(
        &self,
        product_id: ProductId,
    ) -> Result<u32, PipelineError>;

    /// Inserts a raw-file row under the uniqueness invariant.
    async fn register_raw_file(&self, file: &RawFile) -> Result<(), PipelineError>;

    /// Persists mutated fields of an existing raw-file row.
    async fn update_raw_file(&self, file: &RawFile) -> Result<(), PipelineError>;

    /// Advances `current_version := max(current_version, version)`, marks
    /// the version's INGESTING files INGESTED, bumps `updated_at`. One
    /// transaction.
    async fn finalize_ingest(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<(), PipelineError>;

    /// Resolves the version a pipeline run should operate on; see the
    /// module docs of the orchestrator for the explicit/auto semantics.
    async fn resolve_pipeline_version(
        &self,
        product_id: ProductId,
        explicit: Option<u32>,
    ) -> Result<Version, PipelineError>;

    /// Non-deleted raw files of a version, ordered by filename.
    async fn list_raw_files(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<Vec<RawFile>, PipelineError>;

    async fn get_raw_file(&self, id: RawFileId) -> Result<RawFile, PipelineError>;

    /// Distinct versions having at least one file in any of `statuses`,
    /// ascending.
    async fn versions_with_status(
        &self,
        product_id: ProductId,
        statuses: &[RawFileStatus],
    ) -> Result<Vec<u32>, PipelineError>;

    /// Bulk status move for a version's files currently in one of `from`.
    async fn mark_version_files(
        &self,
        product_id: ProductId,
        version: Version,
        from: &[RawFileStatus],
        to: RawFileStatus,
    ) -> Result<u64, PipelineError>;

    // ------------------------------------------------------------------
    // Pipeline runs
    // ------------------------------------------------------------------

    /// Inserts a run in QUEUED, enforcing that no QUEUED/RUNNING run exists
    /// for the `(product, version)` pair.
    async fn begin_run(&self, run: &PipelineRun) -> Result<(), PipelineError>;

    async fn get_run(&self, id: RunId) -> Result<PipelineRun, PipelineError>;

    async fn list_runs(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<PipelineRun>, PipelineError>;

    /// Whether a SUCCEEDED run exists for the pair.
    async fn has_succeeded_run(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<bool, PipelineError>;

    /// Latest SUCCEEDED run of the product, if any.
    async fn latest_succeeded_run(
        &self,
        product_id: ProductId,
    ) -> Result<Option<PipelineRun>, PipelineError>;

    /// Compare-and-set status transition; fails if the stored status is not
    /// `from`. Sets `started_at` on entry to RUNNING and `finished_at` on
    /// entry to a terminal status.
    async fn transition_run(
        &self,
        id: RunId,
        from: RunStatus,
        to: RunStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    /// Sets `cancel_requested`; returns false when the run is already
    /// terminal. Idempotent.
    async fn request_cancel(&self, id: RunId) -> Result<bool, PipelineError>;

    /// Atomically claims the oldest QUEUED run for a worker by moving it to
    /// RUNNING; `None` when the queue is empty.
    async fn claim_queued_run(&self) -> Result<Option<PipelineRun>, PipelineError>;

    /// Records the terminal error message on a run.
    async fn set_run_error(&self, id: RunId, message: &str) -> Result<(), PipelineError>;

    // ------------------------------------------------------------------
    // Stage executions
    // ------------------------------------------------------------------

    /// Creates or patches the `(run, stage)` row.
    async fn upsert_stage(
        &self,
        run_id: RunId,
        stage: StageName,
        patch: StagePatch,
    ) -> Result<(), PipelineError>;

    /// Stage executions of a run in DAG order.
    async fn list_stages(&self, run_id: RunId) -> Result<Vec<StageExecution>, PipelineError>;

    // ------------------------------------------------------------------
    // Artifacts & chunk records
    // ------------------------------------------------------------------

    async fn insert_artifact(&self, artifact: &Artifact) -> Result<(), PipelineError>;

    async fn get_artifact(&self, id: ArtifactId) -> Result<Artifact, PipelineError>;

    async fn list_artifacts(&self, run_id: RunId) -> Result<Vec<Artifact>, PipelineError>;

    /// Inserts or replaces chunk records keyed by `(product, version,
    /// chunk_id)`.
    async fn upsert_chunk_records(
        &self,
        records: &[ChunkRecord],
    ) -> Result<(), PipelineError>;

    async fn query_chunk_records(
        &self,
        query: &ChunkQuery,
    ) -> Result<Vec<ChunkRecord>, PipelineError>;

    // ------------------------------------------------------------------
    // Quality rules & violations
    // ------------------------------------------------------------------

    /// Latest effective rule set; the empty set at version 0 when none was
    /// ever saved.
    async fn get_rule_set(
        &self,
        product_id: ProductId,
    ) -> Result<QualityRuleSet, PipelineError>;

    /// Stores the set as a new version and returns it.
    async fn put_rule_set(&self, set: &QualityRuleSet) -> Result<u32, PipelineError>;

    async fn insert_violations(
        &self,
        violations: &[QualityViolation],
    ) -> Result<(), PipelineError>;

    /// Violations recorded by runs of the product, optionally narrowed to
    /// one version.
    async fn list_violations(
        &self,
        product_id: ProductId,
        version: Option<Version>,
    ) -> Result<Vec<QualityViolation>, PipelineError>;
}
