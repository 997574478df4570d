// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: immutable, self-validating domain values.
//!
//! Value objects have no identity; two with the same attributes are equal.
//! They enforce their own invariants at construction (a `Version` is never
//! zero, a `Checksum` is always 64 hex chars) so entities composed of them
//! cannot hold malformed state.

pub mod blob_location;
pub mod checksum;
pub mod chunk;
pub mod fingerprint;
pub mod generic_id;
pub mod identifiers;
pub mod version;

pub use blob_location::{BlobBucket, BlobLocation};
pub use checksum::{Checksum, ChecksumHasher};
pub use chunk::{Chunk, ChunkId, ChunkScores, ScoredChunk};
pub use fingerprint::{ReadinessFingerprint, TrustWeights};
pub use generic_id::{GenericId, IdCategory};
pub use identifiers::{
    ArtifactId, DataSourceId, ProductId, RawFileId, RunId, WorkspaceId,
};
pub use version::Version;
