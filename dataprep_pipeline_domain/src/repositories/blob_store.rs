// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Blob Store Gateway Interface
//!
//! Bucketed key/value object storage with ETags, existence checks, and
//! presigned download URLs. Writes are atomic per object; there is no
//! partial-write state a reader can observe.
//!
//! ## Failure model
//!
//! A missing key is [`PipelineError::NotFound`], distinct from transient IO
//! failure ([`PipelineError::DependencyUnavailable`]); retrying is the
//! caller's responsibility and only the latter is worth retrying.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::value_objects::BlobLocation;
use crate::PipelineError;

/// Result of a completed write.
#[derive(Debug, Clone)]
pub struct PutResult {
    pub etag: String,
    pub size_bytes: u64,
}

/// Object metadata without the body.
#[derive(Debug, Clone)]
pub struct HeadResult {
    pub etag: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes an object, returning its ETag and size.
    async fn put(
        &self,
        location: &BlobLocation,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<PutResult, PipelineError>;

    /// Reads a whole object.
    async fn get(&self, location: &BlobLocation) -> Result<Bytes, PipelineError>;

    /// Object metadata; `NotFound` when the key is absent.
    async fn head(&self, location: &BlobLocation) -> Result<HeadResult, PipelineError>;

    /// Existence check that does not distinguish why a key is readable.
    async fn exists(&self, location: &BlobLocation) -> Result<bool, PipelineError>;

    /// Presigned download URL valid for `ttl`.
    async fn presign(
        &self,
        location: &BlobLocation,
        ttl: Duration,
    ) -> Result<String, PipelineError>;

    async fn delete(&self, location: &BlobLocation) -> Result<(), PipelineError>;
}
