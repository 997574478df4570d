// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Value Objects
//!
//! A chunk is the unit that flows from preprocessing to scoring to indexing:
//! a normalized span of text cut from one raw file, carrying its provenance
//! (source file, page, section) and a stable identifier.
//!
//! ## Chunk identity
//!
//! Chunk ids must be stable across re-runs of the same version so that vector
//! upserts are idempotent: re-indexing version 4 overwrites version 4's
//! points instead of accumulating duplicates. The id is derived from
//! `(product, version, file_stem, ordinal)` and nothing else - in particular
//! not from the chunk text, so a playbook tweak that changes normalization
//! still addresses the same logical slot.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::identifiers::ProductId;
use super::version::Version;

/// Stable identifier of a chunk within a product version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derives the id for the `ordinal`-th chunk of a file in a version.
    pub fn derive(product: ProductId, version: Version, file_stem: &str, ordinal: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(product.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(version.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(file_stem.as_bytes());
        hasher.update(b":");
        hasher.update(ordinal.to_string().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    /// Rehydrates an id previously produced by [`ChunkId::derive`], e.g.
    /// from a catalog column.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One normalized span of text with provenance, produced by preprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    /// File stem of the raw file this chunk was cut from.
    pub source_file: String,
    /// Zero-based position of this chunk within its source file.
    pub ordinal: u32,
    pub text: String,
    pub page_number: Option<u32>,
    pub section: Option<String>,
    /// Structured-source field this chunk came from, when the source was a
    /// database row rather than a document.
    pub field_name: Option<String>,
    /// Whitespace-token count of `text`.
    pub token_count: u32,
}

/// Per-chunk score vector computed by the scoring stage.
///
/// All components are ratios on a 0-1 scale; readers never re-normalize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkScores {
    pub completeness: f64,
    /// Proxy for factual accuracy (structural coherence of the text).
    pub accuracy: f64,
    pub quality: f64,
    pub timeliness: f64,
    /// Presence of provenance metadata (page, section, field).
    pub metadata_presence: f64,
}

impl ChunkScores {
    /// Clamps every component into the 0-1 persisted scale.
    pub fn clamped(self) -> Self {
        Self {
            completeness: self.completeness.clamp(0.0, 1.0),
            accuracy: self.accuracy.clamp(0.0, 1.0),
            quality: self.quality.clamp(0.0, 1.0),
            timeliness: self.timeliness.clamp(0.0, 1.0),
            metadata_presence: self.metadata_presence.clamp(0.0, 1.0),
        }
    }
}

/// A chunk paired with its scores, the scoring stage's output row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: ChunkId,
    pub source_file: String,
    pub token_count: u32,
    pub scores: ChunkScores,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_stable() {
        let p = ProductId::new();
        let v = Version::new(4).unwrap();
        let a = ChunkId::derive(p, v, "docs-intro", 0);
        let b = ChunkId::derive(p, v, "docs-intro", 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_chunk_id_varies_by_ordinal_and_version() {
        let p = ProductId::new();
        let v4 = Version::new(4).unwrap();
        let v5 = Version::new(5).unwrap();
        assert_ne!(
            ChunkId::derive(p, v4, "docs-intro", 0),
            ChunkId::derive(p, v4, "docs-intro", 1)
        );
        assert_ne!(
            ChunkId::derive(p, v4, "docs-intro", 0),
            ChunkId::derive(p, v5, "docs-intro", 0)
        );
    }

    #[test]
    fn test_scores_clamp_to_unit_scale() {
        let scores = ChunkScores {
            completeness: 1.7,
            accuracy: -0.2,
            quality: 0.5,
            timeliness: 0.0,
            metadata_presence: 1.0,
        }
        .clamped();
        assert_eq!(scores.completeness, 1.0);
        assert_eq!(scores.accuracy, 0.0);
        assert_eq!(scores.quality, 0.5);
    }
}
