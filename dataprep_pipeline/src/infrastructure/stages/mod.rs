// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Implementations
//!
//! The nine steps of the preparation DAG, each a [`Stage`] implementation.
//! [`build_stages`] returns them in the DAG's execution order; the
//! orchestrator never constructs a stage directly.

use std::sync::Arc;

use dataprep_pipeline_domain::entities::StageName;
use dataprep_pipeline_domain::services::Stage;

pub mod finalize;
pub mod fingerprint;
pub mod indexing;
pub mod policy;
pub mod preprocess;
pub mod reporting;
pub mod scoring;
pub mod text;
pub mod validate_quality;
pub mod validation;

pub use finalize::FinalizeStage;
pub use fingerprint::FingerprintStage;
pub use indexing::IndexingStage;
pub use policy::PolicyStage;
pub use preprocess::PreprocessStage;
pub use reporting::ReportingStage;
pub use scoring::ScoringStage;
pub use validate_quality::ValidateQualityStage;
pub use validation::ValidationStage;

/// The stage set in execution order, one entry per [`StageName::DAG`] slot.
pub fn build_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(PreprocessStage),
        Arc::new(ScoringStage),
        Arc::new(FingerprintStage),
        Arc::new(ValidationStage),
        Arc::new(PolicyStage),
        Arc::new(ReportingStage),
        Arc::new(IndexingStage),
        Arc::new(ValidateQualityStage),
        Arc::new(FinalizeStage),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_set_matches_dag_order() {
        let stages = build_stages();
        assert_eq!(stages.len(), StageName::DAG.len());
        for (stage, name) in stages.iter().zip(StageName::DAG) {
            assert_eq!(stage.name(), name);
        }
    }
}
