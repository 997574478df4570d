// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Contract
//!
//! Every step of the preparation DAG implements the same narrow contract:
//!
//! ```text
//! Stage::execute(ctx, blackboard) -> StageOutcome { status, metrics,
//!                                                   artifacts, error }
//! ```
//!
//! The DAG itself is the compile-time constant
//! [`StageName::DAG`](crate::entities::StageName::DAG); the orchestrator
//! walks it in order and a stage never knows its neighbours. Stage outputs
//! that later stages may read travel through the typed [`RunBlackboard`],
//! never through shared mutable state.
//!
//! ## Failure semantics
//!
//! `execute` returning `Err` means the stage could not run at all
//! (infrastructure failure); returning `Ok` with a FAILED status means the
//! stage ran and judged its own outcome. Per-item errors inside a stage are
//! aggregated into metrics and never propagate.
//!
//! ## Cancellation
//!
//! The context carries a [`CancelFlag`]. The durable cancel signal is the
//! run row's `cancel_requested` column; the orchestrator mirrors it into
//! the flag, and long inner loops are expected to poll it. A stage that
//! ignores the flag is still cancelled at the next stage boundary.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::entities::{
    ArtifactDraft, ChunkingConfig, PolicyVerdict, QualityRuleSet, QualityViolation, StageName,
    StageStatus,
};
use crate::repositories::{BlobStore, Catalog, VectorIndex};
use crate::services::embedder::Embedder;
use crate::services::playbook::Playbook;
use crate::value_objects::{
    Chunk, ProductId, ReadinessFingerprint, RunId, ScoredChunk, TrustWeights, Version, WorkspaceId,
};
use crate::PipelineError;

/// In-process cancellation observable handed to every stage.
///
/// Cheap to clone; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Tunables a run snapshots at trigger time.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    /// Per-stage deadline in seconds.
    pub stage_timeout_seconds: u64,
    /// Tolerated embedding failure ratio before indexing fails, 0-1.
    pub indexing_failure_ratio_threshold: f64,
    /// Bounded fan-out width for per-chunk work inside stages.
    pub chunk_concurrency: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            stage_timeout_seconds: 3600,
            indexing_failure_ratio_threshold: 0.05,
            chunk_concurrency: 8,
        }
    }
}

/// Everything a stage may touch, assembled per run by the orchestrator.
///
/// Handles are shared (`Arc<dyn ...>`); the context itself is immutable for
/// the duration of the run.
#[derive(Clone)]
pub struct StageContext {
    pub run_id: RunId,
    pub workspace_id: WorkspaceId,
    pub product_id: ProductId,
    pub version: Version,
    pub chunking: ChunkingConfig,
    pub playbook: Playbook,
    pub rule_set: QualityRuleSet,
    pub trust_weights: TrustWeights,
    pub tuning: PipelineTuning,
    pub catalog: Arc<dyn Catalog>,
    pub blob: Arc<dyn BlobStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub cancel: CancelFlag,
}

/// Summary of the indexing stage for downstream cross-checks.
#[derive(Debug, Clone, Default)]
pub struct IndexingReport {
    pub embedded_count: u64,
    pub failed_count: u64,
    pub dimension: usize,
}

/// Typed outputs each stage may leave for later stages.
///
/// One writer per field: preprocess writes `chunks`, scoring writes
/// `scored`, fingerprint writes `fingerprint`, policy writes `violations`
/// and `verdict`, indexing writes `indexing`.
#[derive(Debug, Default)]
pub struct RunBlackboard {
    pub chunks: Vec<Chunk>,
    pub scored: Vec<ScoredChunk>,
    pub fingerprint: Option<ReadinessFingerprint>,
    pub violations: Vec<QualityViolation>,
    pub verdict: Option<PolicyVerdict>,
    pub indexing: Option<IndexingReport>,
}

/// What a stage reports back to the orchestrator.
#[derive(Debug)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub metrics: BTreeMap<String, f64>,
    pub artifacts: Vec<ArtifactDraft>,
    pub error_message: Option<String>,
}

impl StageOutcome {
    pub fn succeeded() -> Self {
        Self {
            status: StageStatus::Succeeded,
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            metrics: BTreeMap::new(),
            artifacts: Vec::new(),
            error_message: Some(message.into()),
        }
    }

    pub fn with_metric(mut self, key: &str, value: f64) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactDraft) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// One step of the preparation DAG.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The fixed name this stage executes under.
    fn name(&self) -> StageName;

    /// Runs the stage against the context, reading and writing the
    /// blackboard.
    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_across_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_outcome_builders() {
        let ok = StageOutcome::succeeded().with_metric("chunk_count", 12.0);
        assert_eq!(ok.status, StageStatus::Succeeded);
        assert_eq!(ok.metrics["chunk_count"], 12.0);

        let bad = StageOutcome::failed("zero chunks produced");
        assert_eq!(bad.status, StageStatus::Failed);
        assert!(bad.error_message.is_some());
    }

    #[test]
    fn test_default_tuning_matches_documented_defaults() {
        let tuning = PipelineTuning::default();
        assert_eq!(tuning.stage_timeout_seconds, 3600);
        assert!((tuning.indexing_failure_ratio_threshold - 0.05).abs() < 1e-9);
    }
}
