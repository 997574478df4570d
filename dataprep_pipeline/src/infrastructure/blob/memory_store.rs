// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Memory Blob Store
//!
//! Deterministic blob store for tests and local development. ETags are
//! derived from content (SHA-256 prefix) so integrity checks behave like a
//! real object store: re-uploading identical bytes yields the same ETag.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dataprep_pipeline_domain::repositories::{BlobStore, HeadResult, PutResult};
use dataprep_pipeline_domain::value_objects::BlobLocation;
use dataprep_pipeline_domain::PipelineError;

#[derive(Clone)]
struct StoredObject {
    bytes: Bytes,
    etag: String,
    content_type: String,
}

/// Blob store holding every object in process memory.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn object_key(location: &BlobLocation) -> String {
        format!("{}/{}", location.bucket.as_str(), location.key)
    }

    fn content_etag(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(&hasher.finalize()[..16])
    }

    /// Number of stored objects, for test assertions.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Removes an object out-of-band, simulating external tampering.
    pub fn corrupt(&self, location: &BlobLocation) {
        self.objects.write().remove(&Self::object_key(location));
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        location: &BlobLocation,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<PutResult, PipelineError> {
        let etag = Self::content_etag(&bytes);
        let size_bytes = bytes.len() as u64;
        self.objects.write().insert(
            Self::object_key(location),
            StoredObject {
                bytes,
                etag: etag.clone(),
                content_type: content_type.to_string(),
            },
        );
        Ok(PutResult { etag, size_bytes })
    }

    async fn get(&self, location: &BlobLocation) -> Result<Bytes, PipelineError> {
        self.objects
            .read()
            .get(&Self::object_key(location))
            .map(|o| o.bytes.clone())
            .ok_or_else(|| PipelineError::NotFound(format!("blob {}", location)))
    }

    async fn head(&self, location: &BlobLocation) -> Result<HeadResult, PipelineError> {
        self.objects
            .read()
            .get(&Self::object_key(location))
            .map(|o| HeadResult {
                etag: o.etag.clone(),
                size_bytes: o.bytes.len() as u64,
                content_type: Some(o.content_type.clone()),
            })
            .ok_or_else(|| PipelineError::NotFound(format!("blob {}", location)))
    }

    async fn exists(&self, location: &BlobLocation) -> Result<bool, PipelineError> {
        Ok(self.objects.read().contains_key(&Self::object_key(location)))
    }

    async fn presign(
        &self,
        location: &BlobLocation,
        ttl: Duration,
    ) -> Result<String, PipelineError> {
        if !self.exists(location).await? {
            return Err(PipelineError::NotFound(format!("blob {}", location)));
        }
        Ok(format!(
            "memory://{}/{}?ttl={}",
            location.bucket.as_str(),
            location.key,
            ttl.as_secs()
        ))
    }

    async fn delete(&self, location: &BlobLocation) -> Result<(), PipelineError> {
        self.objects.write().remove(&Self::object_key(location));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_pipeline_domain::value_objects::BlobBucket;

    fn loc(key: &str) -> BlobLocation {
        BlobLocation::new(BlobBucket::Raw, key)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = MemoryBlobStore::new();
        store
            .put(&loc("a/b"), Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        let bytes = store.get(&loc("a/b")).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_etag_is_content_derived() {
        let store = MemoryBlobStore::new();
        let first = store
            .put(&loc("x"), Bytes::from_static(b"same"), "text/plain")
            .await
            .unwrap();
        let second = store
            .put(&loc("x"), Bytes::from_static(b"same"), "text/plain")
            .await
            .unwrap();
        assert_eq!(first.etag, second.etag);

        let changed = store
            .put(&loc("x"), Bytes::from_static(b"different"), "text/plain")
            .await
            .unwrap();
        assert_ne!(first.etag, changed.etag);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        match store.get(&loc("absent")).await {
            Err(PipelineError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|b| b.len())),
        }
        assert!(!store.exists(&loc("absent")).await.unwrap());
    }

    #[tokio::test]
    async fn test_head_reports_metadata() {
        let store = MemoryBlobStore::new();
        store
            .put(&loc("m"), Bytes::from_static(b"12345"), "application/json")
            .await
            .unwrap();
        let head = store.head(&loc("m")).await.unwrap();
        assert_eq!(head.size_bytes, 5);
        assert_eq!(head.content_type.as_deref(), Some("application/json"));
    }
}
