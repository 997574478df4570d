// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Checksum Value Object
//!
//! SHA-256 content digest recorded on every ingested raw file. The checksum
//! is computed while streaming bytes to the blob store and is the content
//! half of the raw-file integrity invariant (the ETag is the storage half):
//! two ingests of the same source item under the same version must produce
//! bit-identical checksums.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};

use crate::PipelineError;

/// Lowercase hex SHA-256 digest of a raw file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Computes the checksum of a byte slice.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-computed digest, validating shape.
    pub fn from_hex(s: &str) -> Result<Self, PipelineError> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::InvalidInput(format!(
                "checksum must be 64 hex characters, got '{}'",
                s
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Returns the hex digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental checksum builder for streamed uploads.
///
/// Ingestion feeds each fetched chunk of bytes through the hasher while it is
/// being uploaded, so the digest is available the moment the upload finishes
/// without re-reading the object.
#[derive(Default)]
pub struct ChecksumHasher {
    inner: Sha256,
}

impl ChecksumHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finalize(self) -> Checksum {
        Checksum(hex::encode(self.inner.finalize()))
    }
}
