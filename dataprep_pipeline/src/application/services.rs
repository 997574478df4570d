// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Services Bundle
//!
//! The dependency bundle constructed once at startup and passed explicitly
//! to handlers, the ingest coordinator, and the pipeline workers. There are
//! no process-wide mutable singletons; anything a component needs arrives
//! through this struct.

use std::sync::Arc;

use dataprep_pipeline_domain::repositories::{BlobStore, Catalog, VectorIndex};
use dataprep_pipeline_domain::services::stage::PipelineTuning;
use dataprep_pipeline_domain::services::{Embedder, Playbook, Quota, Stage};
use dataprep_pipeline_domain::value_objects::TrustWeights;

use crate::infrastructure::metrics::MetricsService;

/// Shared handles and settings for every component.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn Catalog>,
    pub blob: Arc<dyn BlobStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub quota: Arc<dyn Quota>,
    pub metrics: MetricsService,
    pub stages: Arc<Vec<Arc<dyn Stage>>>,
    pub tuning: PipelineTuning,
    pub trust_weights: TrustWeights,
    pub playbook: Playbook,
    /// Bounded fan-out width per data source during ingest.
    pub ingest_concurrency: usize,
}

impl Services {
    /// Bundles the handles with default stage set and tunables; callers
    /// override fields as needed before sharing.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        blob: Arc<dyn BlobStore>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        quota: Arc<dyn Quota>,
        metrics: MetricsService,
    ) -> Self {
        Self {
            catalog,
            blob,
            vectors,
            embedder,
            quota,
            metrics,
            stages: Arc::new(crate::infrastructure::stages::build_stages()),
            tuning: PipelineTuning::default(),
            trust_weights: TrustWeights::default(),
            playbook: Playbook::default(),
            ingest_concurrency: 8,
        }
    }
}
