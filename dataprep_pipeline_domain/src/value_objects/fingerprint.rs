// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Readiness Fingerprint
//!
//! Product-level aggregation of per-chunk scores into normalized trust
//! metrics, including the composite `ai_trust_score`. The weighting of
//! sub-metrics into the composite is a pure function over [`TrustWeights`]
//! so a product team can rebalance it without touching the fingerprint
//! stage; the defaults below are the documented baseline.
//!
//! Every metric in the fingerprint is on a 0-1 scale except the explicit
//! `*_count` fields. Normalization happens here, at the write boundary;
//! readers (API, reports) never re-scale.

use serde::{Deserialize, Serialize};

use super::chunk::ScoredChunk;

/// Weights for folding sub-metrics into the composite trust score.
///
/// Weights are relative; [`TrustWeights::score`] normalizes by their sum, so
/// `{0.25, 0.25, 0.20, 0.15, 0.15}` and `{25, 25, 20, 15, 15}` are the same
/// weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustWeights {
    pub completeness: f64,
    pub accuracy: f64,
    pub quality: f64,
    pub timeliness: f64,
    pub metadata_presence: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            completeness: 0.25,
            accuracy: 0.25,
            quality: 0.20,
            timeliness: 0.15,
            metadata_presence: 0.15,
        }
    }
}

impl TrustWeights {
    /// Computes the weighted composite of the mean sub-metrics.
    pub fn score(&self, fp: &ReadinessFingerprint) -> f64 {
        let total = self.completeness
            + self.accuracy
            + self.quality
            + self.timeliness
            + self.metadata_presence;
        if total <= 0.0 {
            return 0.0;
        }
        let weighted = fp.mean_completeness * self.completeness
            + fp.mean_accuracy * self.accuracy
            + fp.mean_quality * self.quality
            + fp.mean_timeliness * self.timeliness
            + fp.mean_metadata_presence * self.metadata_presence;
        (weighted / total).clamp(0.0, 1.0)
    }
}

/// Normalized trust-related metrics for one product version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessFingerprint {
    pub chunk_count: u64,
    pub source_file_count: u64,
    pub total_token_count: u64,
    pub mean_completeness: f64,
    pub mean_accuracy: f64,
    pub mean_quality: f64,
    pub mean_timeliness: f64,
    pub mean_metadata_presence: f64,
    /// Weighted composite of the means, 0-1.
    pub ai_trust_score: f64,
}

impl ReadinessFingerprint {
    /// Aggregates scored chunks into a fingerprint using the given weights.
    ///
    /// An empty input yields the all-zero fingerprint; the fingerprint stage
    /// never runs on zero chunks (preprocess fails the run first), but the
    /// aggregation itself is total.
    pub fn aggregate(chunks: &[ScoredChunk], weights: &TrustWeights) -> Self {
        if chunks.is_empty() {
            return Self {
                chunk_count: 0,
                source_file_count: 0,
                total_token_count: 0,
                mean_completeness: 0.0,
                mean_accuracy: 0.0,
                mean_quality: 0.0,
                mean_timeliness: 0.0,
                mean_metadata_presence: 0.0,
                ai_trust_score: 0.0,
            };
        }

        let n = chunks.len() as f64;
        let mut sources = std::collections::BTreeSet::new();
        let mut tokens: u64 = 0;
        let (mut completeness, mut accuracy, mut quality, mut timeliness, mut metadata) =
            (0.0, 0.0, 0.0, 0.0, 0.0);
        for chunk in chunks {
            sources.insert(chunk.source_file.as_str());
            tokens += u64::from(chunk.token_count);
            let s = chunk.scores.clamped();
            completeness += s.completeness;
            accuracy += s.accuracy;
            quality += s.quality;
            timeliness += s.timeliness;
            metadata += s.metadata_presence;
        }

        let mut fp = Self {
            chunk_count: chunks.len() as u64,
            source_file_count: sources.len() as u64,
            total_token_count: tokens,
            mean_completeness: completeness / n,
            mean_accuracy: accuracy / n,
            mean_quality: quality / n,
            mean_timeliness: timeliness / n,
            mean_metadata_presence: metadata / n,
            ai_trust_score: 0.0,
        };
        fp.ai_trust_score = weights.score(&fp);
        fp
    }
}
