// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Run and Stage Execution Entities
//!
//! A pipeline run is one execution of the preparation DAG against a single
//! product version. The stage set and its order are fixed at compile time:
//!
//! ```text
//! preprocess → scoring → fingerprint → validation → policy
//!           → reporting → indexing → validate_quality → finalize
//! ```
//!
//! ## Invariants
//!
//! - At most one run with status QUEUED or RUNNING per `(product, version)`
//! - At most one run with status SUCCEEDED per `(product, version)`
//! - `(run_id, stage_name)` uniquely identifies a stage execution
//! - Run status transitions are compare-and-set; the first observed terminal
//!   status wins when a cancellation races completion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value_objects::{ProductId, RunId, Version, WorkspaceId};
use crate::PipelineError;

/// Status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "QUEUED" => Ok(RunStatus::Queued),
            "RUNNING" => Ok(RunStatus::Running),
            "SUCCEEDED" => Ok(RunStatus::Succeeded),
            "FAILED" => Ok(RunStatus::Failed),
            "CANCELLED" => Ok(RunStatus::Cancelled),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown run status '{}'",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// The fixed, ordered stage set of the preparation DAG.
///
/// The DAG is a path; [`StageName::DAG`] is the only admissible execution
/// order. Future parallel branches would fan out from `Scoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Preprocess,
    Scoring,
    Fingerprint,
    Validation,
    Policy,
    Reporting,
    Indexing,
    ValidateQuality,
    Finalize,
}

impl StageName {
    /// The DAG in execution order.
    pub const DAG: [StageName; 9] = [
        StageName::Preprocess,
        StageName::Scoring,
        StageName::Fingerprint,
        StageName::Validation,
        StageName::Policy,
        StageName::Reporting,
        StageName::Indexing,
        StageName::ValidateQuality,
        StageName::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Preprocess => "preprocess",
            StageName::Scoring => "scoring",
            StageName::Fingerprint => "fingerprint",
            StageName::Validation => "validation",
            StageName::Policy => "policy",
            StageName::Reporting => "reporting",
            StageName::Indexing => "indexing",
            StageName::ValidateQuality => "validate_quality",
            StageName::Finalize => "finalize",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        StageName::DAG
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidInput(format!("unknown stage '{}'", s)))
    }

    /// Whether a FAILED outcome of this stage terminates the run.
    ///
    /// Finalize settles state and must not fail; every other stage is
    /// terminal on failure (stage-internal tolerance happens before the
    /// stage reports its outcome).
    pub fn is_terminal_on_failure(&self) -> bool {
        !matches!(self, StageName::Finalize)
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one stage execution within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "PENDING",
            StageStatus::Running => "RUNNING",
            StageStatus::Succeeded => "SUCCEEDED",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "PENDING" => Ok(StageStatus::Pending),
            "RUNNING" => Ok(StageStatus::Running),
            "SUCCEEDED" => Ok(StageStatus::Succeeded),
            "FAILED" => Ok(StageStatus::Failed),
            "SKIPPED" => Ok(StageStatus::Skipped),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown stage status '{}'",
                other
            ))),
        }
    }
}

/// Why a run was triggered; recorded for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Manual,
    Retry,
    Forced,
}

/// One execution of the preparation DAG against a product version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub workspace_id: WorkspaceId,
    pub product_id: ProductId,
    pub version: Version,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Config the run was resolved against, frozen at trigger time.
    pub config_snapshot: serde_json::Value,
    pub trigger_reason: TriggerReason,
    pub cancel_requested: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn new(
        workspace_id: WorkspaceId,
        product_id: ProductId,
        version: Version,
        config_snapshot: serde_json::Value,
        trigger_reason: TriggerReason,
    ) -> Self {
        Self {
            id: RunId::new(),
            workspace_id,
            product_id,
            version,
            status: RunStatus::Queued,
            started_at: None,
            finished_at: None,
            config_snapshot,
            trigger_reason,
            cancel_requested: false,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Persisted state of one stage within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub run_id: RunId,
    pub stage_name: StageName,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Normalized metrics: ratios on a 0-1 scale, counts suffixed `_count`
    /// or `_total`.
    pub metrics: BTreeMap<String, f64>,
    pub error_message: Option<String>,
}

impl StageExecution {
    pub fn pending(run_id: RunId, stage_name: StageName) -> Self {
        Self {
            run_id,
            stage_name,
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            metrics: BTreeMap::new(),
            error_message: None,
        }
    }
}

/// Partial update applied to a stage execution row.
///
/// `None` fields are left untouched so the orchestrator can mark RUNNING
/// with a start time and later apply the outcome without re-sending it.
#[derive(Debug, Clone, Default)]
pub struct StagePatch {
    pub status: Option<StageStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: Option<BTreeMap<String, f64>>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dag_order_is_the_fixed_path() {
        let names: Vec<&str> = StageName::DAG.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "preprocess",
                "scoring",
                "fingerprint",
                "validation",
                "policy",
                "reporting",
                "indexing",
                "validate_quality",
                "finalize"
            ]
        );
    }

    #[test]
    fn test_stage_name_round_trip() {
        for stage in StageName::DAG {
            assert_eq!(StageName::parse(stage.as_str()).unwrap(), stage);
        }
        assert!(StageName::parse("embedding").is_err());
    }

    #[test]
    fn test_finalize_never_terminal_on_failure() {
        assert!(!StageName::Finalize.is_terminal_on_failure());
        assert!(StageName::Indexing.is_terminal_on_failure());
    }

    #[test]
    fn test_run_status_terminality() {
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Queued.is_active());
        assert!(RunStatus::Running.is_active());
    }

    #[test]
    fn test_new_run_starts_queued() {
        let run = PipelineRun::new(
            WorkspaceId::new(),
            ProductId::new(),
            Version::first(),
            serde_json::json!({}),
            TriggerReason::Manual,
        );
        assert_eq!(run.status, RunStatus::Queued);
        assert!(!run.cancel_requested);
        assert!(run.started_at.is_none());
    }
}
