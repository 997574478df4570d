// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # S3 Blob Store
//!
//! Blob store gateway over any S3-compatible object store (AWS S3, MinIO).
//! Logical buckets map to real buckets named `<prefix><bucket>`; keys are
//! used verbatim. Presigned GET URLs back artifact downloads so the API
//! never proxies large objects.

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Duration;

use dataprep_pipeline_domain::repositories::{BlobStore, HeadResult, PutResult};
use dataprep_pipeline_domain::value_objects::BlobLocation;
use dataprep_pipeline_domain::PipelineError;

use crate::infrastructure::config::BlobConfig;

/// S3-backed blob store.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket_prefix: String,
}

impl S3BlobStore {
    /// Builds a client from the `blob.*` settings. A custom endpoint turns
    /// on path-style addressing, which MinIO requires.
    pub async fn from_config(cfg: &BlobConfig, bucket_prefix: &str) -> Self {
        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &cfg.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&cfg.access_key, &cfg.secret_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "dataprep-config",
            ));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        Self {
            client,
            bucket_prefix: bucket_prefix.to_string(),
        }
    }

    pub fn new(client: Client, bucket_prefix: &str) -> Self {
        Self {
            client,
            bucket_prefix: bucket_prefix.to_string(),
        }
    }

    fn bucket_name(&self, location: &BlobLocation) -> String {
        format!("{}{}", self.bucket_prefix, location.bucket.as_str())
    }
}

fn dependency_err(op: &str, location: &BlobLocation, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::DependencyUnavailable(format!("blob {} {}: {}", op, location, err))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        location: &BlobLocation,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<PutResult, PipelineError> {
        let size_bytes = bytes.len() as u64;
        let resp = self
            .client
            .put_object()
            .bucket(self.bucket_name(location))
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| dependency_err("put", location, e))?;
        let etag = resp
            .e_tag()
            .map(|t| t.trim_matches('"').to_string())
            .unwrap_or_default();
        Ok(PutResult { etag, size_bytes })
    }

    async fn get(&self, location: &BlobLocation) -> Result<Bytes, PipelineError> {
        let resp = self
            .client
            .get_object()
            .bucket(self.bucket_name(location))
            .key(&location.key)
            .send()
            .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    return Err(PipelineError::NotFound(format!("blob {}", location)));
                }
                return Err(dependency_err("get", location, err));
            }
        };
        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| dependency_err("get", location, e))?;
        Ok(data.into_bytes())
    }

    async fn head(&self, location: &BlobLocation) -> Result<HeadResult, PipelineError> {
        let resp = self
            .client
            .head_object()
            .bucket(self.bucket_name(location))
            .key(&location.key)
            .send()
            .await;
        match resp {
            Ok(head) => Ok(HeadResult {
                etag: head
                    .e_tag()
                    .map(|t| t.trim_matches('"').to_string())
                    .unwrap_or_default(),
                size_bytes: head.content_length().unwrap_or(0) as u64,
                content_type: head.content_type().map(|s| s.to_string()),
            }),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    return Err(PipelineError::NotFound(format!("blob {}", location)));
                }
                Err(dependency_err("head", location, err))
            }
        }
    }

    async fn exists(&self, location: &BlobLocation) -> Result<bool, PipelineError> {
        match self.head(location).await {
            Ok(_) => Ok(true),
            Err(PipelineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn presign(
        &self,
        location: &BlobLocation,
        ttl: Duration,
    ) -> Result<String, PipelineError> {
        let config = PresigningConfig::expires_in(ttl)
            .map_err(|e| dependency_err("presign", location, e))?;
        let presigned = self
            .client
            .get_object()
            .bucket(self.bucket_name(location))
            .key(&location.key)
            .presigned(config)
            .await
            .map_err(|e| dependency_err("presign", location, e))?;
        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, location: &BlobLocation) -> Result<(), PipelineError> {
        self.client
            .delete_object()
            .bucket(self.bucket_name(location))
            .key(&location.key)
            .send()
            .await
            .map_err(|e| dependency_err("delete", location, e))?;
        Ok(())
    }
}
