// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Blob Location Value Object
//!
//! Logical bucket plus object key, the address of every persisted object.
//! The persisted layout is fixed:
//!
//! ```text
//! raw/<workspace>/<product>/<version>/<file_stem>      originals
//! clean/<workspace>/<product>/<version>/chunks.jsonl   chunks
//! embed/<workspace>/<product>/<version>/vectors.bin    packed vectors
//! report/<workspace>/<product>/<version>/{policy.json, fingerprint.json,
//!                                         report.csv, report.pdf}
//! ```
//!
//! Key construction lives here so no stage or coordinator ever concatenates
//! path fragments by hand.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use super::identifiers::{ProductId, WorkspaceId};
use super::version::Version;
use crate::PipelineError;

/// The bucketed namespaces of the blob store gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobBucket {
    Raw,
    Clean,
    Chunk,
    Embed,
    Export,
    Report,
}

impl BlobBucket {
    /// All buckets, in a stable order.
    pub const ALL: [BlobBucket; 6] = [
        BlobBucket::Raw,
        BlobBucket::Clean,
        BlobBucket::Chunk,
        BlobBucket::Embed,
        BlobBucket::Export,
        BlobBucket::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlobBucket::Raw => "raw",
            BlobBucket::Clean => "clean",
            BlobBucket::Chunk => "chunk",
            BlobBucket::Embed => "embed",
            BlobBucket::Export => "export",
            BlobBucket::Report => "report",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "raw" => Ok(BlobBucket::Raw),
            "clean" => Ok(BlobBucket::Clean),
            "chunk" => Ok(BlobBucket::Chunk),
            "embed" => Ok(BlobBucket::Embed),
            "export" => Ok(BlobBucket::Export),
            "report" => Ok(BlobBucket::Report),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown blob bucket '{}'",
                other
            ))),
        }
    }
}

impl Display for BlobBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one object in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobLocation {
    pub bucket: BlobBucket,
    pub key: String,
}

impl BlobLocation {
    pub fn new(bucket: BlobBucket, key: impl Into<String>) -> Self {
        Self {
            bucket,
            key: key.into(),
        }
    }

    /// Address of an original raw file.
    pub fn raw_file(
        workspace: WorkspaceId,
        product: ProductId,
        version: Version,
        file_stem: &str,
    ) -> Self {
        Self::new(
            BlobBucket::Raw,
            format!("{workspace}/{product}/{version}/{file_stem}"),
        )
    }

    /// Address of the chunk JSONL for a product version.
    pub fn chunks_jsonl(workspace: WorkspaceId, product: ProductId, version: Version) -> Self {
        Self::new(
            BlobBucket::Clean,
            format!("{workspace}/{product}/{version}/chunks.jsonl"),
        )
    }

    /// Address of the packed embedding vectors for a product version.
    pub fn vectors_bin(workspace: WorkspaceId, product: ProductId, version: Version) -> Self {
        Self::new(
            BlobBucket::Embed,
            format!("{workspace}/{product}/{version}/vectors.bin"),
        )
    }

    /// Address of a named report object (`policy.json`, `fingerprint.json`,
    /// `report.csv`, `report.pdf`, `summary.json`).
    pub fn report(
        workspace: WorkspaceId,
        product: ProductId,
        version: Version,
        name: &str,
    ) -> Self {
        Self::new(
            BlobBucket::Report,
            format!("{workspace}/{product}/{version}/{name}"),
        )
    }
}

impl Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}
