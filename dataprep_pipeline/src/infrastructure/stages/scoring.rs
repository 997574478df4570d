// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Scoring Stage
//!
//! Computes the per-chunk score vector: completeness, accuracy proxy,
//! quality, timeliness, and metadata presence, every component on the 0-1
//! persisted scale. Scores are heuristic by design - the formulas are
//! pluggable stage code, and the pipeline only relies on their contract
//! (a vector per chunk, normalized at this write boundary).
//!
//! Per-chunk scoring errors are tolerated and counted; the stage succeeds
//! as long as at least one chunk was scored.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

use dataprep_pipeline_domain::entities::StageName;
use dataprep_pipeline_domain::services::{RunBlackboard, Stage, StageContext, StageOutcome};
use dataprep_pipeline_domain::value_objects::{Chunk, ChunkScores, ScoredChunk};
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

/// Stage implementation for `scoring`.
pub struct ScoringStage;

#[async_trait]
impl Stage for ScoringStage {
    fn name(&self) -> StageName {
        StageName::Scoring
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        if board.chunks.is_empty() {
            return Ok(StageOutcome::failed("no chunks available to score"));
        }

        // Timeliness derives from each source file's ingest age.
        let files = ctx
            .catalog
            .list_raw_files(ctx.product_id, ctx.version)
            .await?;
        let ages: HashMap<String, f64> = files
            .into_iter()
            .map(|f| {
                let days = (Utc::now() - f.ingested_at).num_days().max(0) as f64;
                (f.file_stem, days)
            })
            .collect();

        let mut scored = Vec::with_capacity(board.chunks.len());
        let mut error_count: u64 = 0;
        for chunk in &board.chunks {
            if chunk.text.trim().is_empty() {
                error_count += 1;
                continue;
            }
            let age_days = ages.get(&chunk.source_file).copied().unwrap_or(0.0);
            scored.push(ScoredChunk {
                chunk_id: chunk.chunk_id.clone(),
                source_file: chunk.source_file.clone(),
                token_count: chunk.token_count,
                scores: score_chunk(chunk, age_days, ctx.chunking.target_tokens),
            });
        }

        if scored.is_empty() {
            return Ok(StageOutcome::failed("every chunk failed scoring")
                .with_metric("score_error_count", error_count as f64));
        }

        // Fold the composite back onto the chunk records for drill-down.
        let weights = &ctx.trust_weights;
        let mut records = ctx
            .catalog
            .query_chunk_records(&dataprep_pipeline_domain::repositories::ChunkQuery {
                product_id: ctx.product_id,
                version: ctx.version,
                section: None,
                field_name: None,
                limit: u32::MAX,
                offset: 0,
            })
            .await?;
        let composite: HashMap<&str, f64> = scored
            .iter()
            .map(|s| {
                let c = s.scores;
                let total = weights.completeness
                    + weights.accuracy
                    + weights.quality
                    + weights.timeliness
                    + weights.metadata_presence;
                let value = (c.completeness * weights.completeness
                    + c.accuracy * weights.accuracy
                    + c.quality * weights.quality
                    + c.timeliness * weights.timeliness
                    + c.metadata_presence * weights.metadata_presence)
                    / total.max(f64::EPSILON);
                (s.chunk_id.as_str(), value)
            })
            .collect();
        for record in &mut records {
            record.score = composite.get(record.chunk_id.as_str()).copied();
        }
        ctx.catalog.upsert_chunk_records(&records).await?;

        let mean_quality =
            scored.iter().map(|s| s.scores.quality).sum::<f64>() / scored.len() as f64;
        let scored_count = scored.len();
        board.scored = scored;

        Ok(StageOutcome::succeeded()
            .with_metric("scored_count", scored_count as f64)
            .with_metric("score_error_count", error_count as f64)
            .with_metric("mean_quality", mean_quality))
    }
}

/// Scores one chunk. Pure, total, and clamped to the unit scale.
fn score_chunk(chunk: &Chunk, age_days: f64, target_tokens: u32) -> ChunkScores {
    let chars: Vec<char> = chunk.text.chars().collect();
    let char_count = chars.len().max(1);

    // Completeness: terminal punctuation and reasonable fill of the target
    // chunk size.
    let ends_complete = chunk
        .text
        .trim_end()
        .ends_with(['.', '!', '?', ':', '"', '\'']);
    let fill = f64::from(chunk.token_count.min(target_tokens)) / f64::from(target_tokens.max(1));
    let completeness = 0.5 * fill + if ends_complete { 0.5 } else { 0.2 };

    // Accuracy proxy: clean character inventory (no replacement chars, few
    // control chars, balanced alphanumeric share).
    let replacement = chars.iter().filter(|c| **c == '\u{FFFD}').count();
    let control = chars
        .iter()
        .filter(|c| c.is_control() && **c != '\n' && **c != '\t')
        .count();
    let alnum = chars.iter().filter(|c| c.is_alphanumeric()).count();
    let accuracy = (alnum as f64 / char_count as f64)
        * if replacement + control == 0 { 1.0 } else { 0.5 };

    // Quality: lexical variety.
    let tokens: Vec<&str> = chunk.text.split_whitespace().collect();
    let unique: std::collections::BTreeSet<&str> = tokens.iter().copied().collect();
    let quality = if tokens.is_empty() {
        0.0
    } else {
        unique.len() as f64 / tokens.len() as f64
    };

    // Timeliness: linear decay over a year of ingest age.
    let timeliness = (1.0 - age_days / 365.0).clamp(0.0, 1.0);

    // Metadata presence: provenance fields attached to the chunk.
    let present = [
        chunk.page_number.is_some(),
        chunk.section.is_some(),
        chunk.field_name.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    let metadata_presence = 0.4 + 0.2 * present as f64;

    ChunkScores {
        completeness,
        accuracy,
        quality,
        timeliness,
        metadata_presence,
    }
    .clamped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::stages::text;
    use dataprep_pipeline_domain::value_objects::{ChunkId, ProductId, Version};

    fn chunk(text: &str, section: Option<&str>) -> Chunk {
        Chunk {
            chunk_id: ChunkId::derive(ProductId::new(), Version::first(), "f", 0),
            source_file: "f".to_string(),
            ordinal: 0,
            token_count: text::token_count(text),
            text: text.to_string(),
            page_number: None,
            section: section.map(|s| s.to_string()),
            field_name: None,
        }
    }

    #[test]
    fn test_scores_are_unit_scaled() {
        let c = chunk("A complete, well formed sentence about the product.", Some("intro"));
        let scores = score_chunk(&c, 10.0, 320);
        for value in [
            scores.completeness,
            scores.accuracy,
            scores.quality,
            scores.timeliness,
            scores.metadata_presence,
        ] {
            assert!((0.0..=1.0).contains(&value), "out of scale: {}", value);
        }
    }

    #[test]
    fn test_stale_files_score_lower_timeliness() {
        let c = chunk("Sentence.", None);
        let fresh = score_chunk(&c, 0.0, 320);
        let stale = score_chunk(&c, 400.0, 320);
        assert!(fresh.timeliness > stale.timeliness);
        assert_eq!(stale.timeliness, 0.0);
    }

    #[test]
    fn test_metadata_presence_rewards_provenance() {
        let bare = score_chunk(&chunk("Sentence.", None), 0.0, 320);
        let sectioned = score_chunk(&chunk("Sentence.", Some("setup")), 0.0, 320);
        assert!(sectioned.metadata_presence > bare.metadata_presence);
    }

    #[test]
    fn test_repetition_lowers_quality() {
        let varied = score_chunk(&chunk("alpha beta gamma delta epsilon.", None), 0.0, 320);
        let repeated = score_chunk(&chunk("spam spam spam spam spam.", None), 0.0, 320);
        assert!(varied.quality > repeated.quality);
    }
}
