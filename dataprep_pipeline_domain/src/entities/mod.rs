// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entities: domain objects with identity and lifecycle.
//!
//! Ownership is single-parent throughout: a product owns its data sources,
//! raw files, runs, and rule set; a run owns its stage executions, artifacts,
//! and violations. Cross-links (a raw file's `data_source_id`) are weak
//! foreign-key references, never ownership edges.

pub mod artifact;
pub mod data_source;
pub mod pipeline_run;
pub mod product;
pub mod quality;
pub mod raw_file;

pub use artifact::{Artifact, ArtifactDraft, ArtifactType, ChunkRecord};
pub use data_source::{
    DataSource, DatabaseSourceConfig, FolderSourceConfig, SourceType, WebSourceConfig,
};
pub use pipeline_run::{
    PipelineRun, RunStatus, StageExecution, StageName, StagePatch, StageStatus, TriggerReason,
};
pub use product::{ChunkingConfig, Product, ProductStatus};
pub use quality::{
    BadExtensionsRule, ChunkCoverageRule, ContentLengthRule, DuplicateRateRule, FileSizeRule,
    FreshnessRule, PolicyVerdict, QualityRule, QualityRuleSet, QualityViolation,
    RequiredFieldsRule, RuleKind, Severity,
};
pub use raw_file::{RawFile, RawFileStatus};
