// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus metrics for ingestion and pipeline execution, collected behind
//! one service handle and rendered at `GET /metrics`. Everything is owned by
//! a private registry so tests can construct isolated instances.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use dataprep_pipeline_domain::entities::StageName;
use dataprep_pipeline_domain::PipelineError;

/// Collects operational metrics for the service.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    runs_total: IntCounterVec,
    active_runs: IntGauge,
    stage_duration_seconds: HistogramVec,

    files_ingested_total: IntCounter,
    files_failed_total: IntCounter,
    ingest_duration_seconds: Histogram,

    chunks_produced_total: IntCounter,
    vectors_written_total: IntCounter,
}

impl MetricsService {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let runs_total = IntCounterVec::new(
            Opts::new("dataprep_runs_total", "Pipeline runs by terminal status"),
            &["status"],
        )
        .map_err(metrics_err)?;

        let active_runs = IntGauge::with_opts(Opts::new(
            "dataprep_active_runs",
            "Pipeline runs currently executing",
        ))
        .map_err(metrics_err)?;

        let stage_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dataprep_stage_duration_seconds",
                "Wall-clock duration per stage",
            )
            .buckets(vec![0.05, 0.25, 1.0, 5.0, 30.0, 120.0, 600.0, 3600.0]),
            &["stage"],
        )
        .map_err(metrics_err)?;

        let files_ingested_total = IntCounter::with_opts(Opts::new(
            "dataprep_files_ingested_total",
            "Raw files successfully ingested",
        ))
        .map_err(metrics_err)?;

        let files_failed_total = IntCounter::with_opts(Opts::new(
            "dataprep_files_failed_total",
            "Raw files that failed ingestion or integrity checks",
        ))
        .map_err(metrics_err)?;

        let ingest_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "dataprep_ingest_duration_seconds",
                "Wall-clock duration of ingest batches",
            )
            .buckets(vec![0.1, 0.5, 2.0, 10.0, 60.0, 300.0]),
        )
        .map_err(metrics_err)?;

        let chunks_produced_total = IntCounter::with_opts(Opts::new(
            "dataprep_chunks_produced_total",
            "Chunks produced by preprocessing",
        ))
        .map_err(metrics_err)?;

        let vectors_written_total = IntCounter::with_opts(Opts::new(
            "dataprep_vectors_written_total",
            "Embeddings written to the vector index",
        ))
        .map_err(metrics_err)?;

        registry
            .register(Box::new(runs_total.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(active_runs.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(stage_duration_seconds.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(files_ingested_total.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(files_failed_total.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(ingest_duration_seconds.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(chunks_produced_total.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(vectors_written_total.clone()))
            .map_err(metrics_err)?;

        Ok(Self {
            registry: Arc::new(registry),
            runs_total,
            active_runs,
            stage_duration_seconds,
            files_ingested_total,
            files_failed_total,
            ingest_duration_seconds,
            chunks_produced_total,
            vectors_written_total,
        })
    }

    pub fn run_started(&self) {
        self.active_runs.inc();
    }

    pub fn run_finished(&self, terminal_status: &str) {
        self.active_runs.dec();
        self.runs_total.with_label_values(&[terminal_status]).inc();
    }

    pub fn observe_stage(&self, stage: StageName, duration: std::time::Duration) {
        self.stage_duration_seconds
            .with_label_values(&[stage.as_str()])
            .observe(duration.as_secs_f64());
    }

    pub fn files_ingested(&self, count: u64) {
        self.files_ingested_total.inc_by(count);
    }

    pub fn files_failed(&self, count: u64) {
        self.files_failed_total.inc_by(count);
    }

    pub fn observe_ingest(&self, duration: std::time::Duration) {
        self.ingest_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn chunks_produced(&self, count: u64) {
        self.chunks_produced_total.inc_by(count);
    }

    pub fn vectors_written(&self, count: u64) {
        self.vectors_written_total.inc_by(count);
    }

    /// Renders the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, PipelineError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_err)?;
        String::from_utf8(buffer)
            .map_err(|e| PipelineError::InternalError(format!("metrics encoding: {}", e)))
    }
}

fn metrics_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::InternalError(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_appear_in_rendered_output() {
        let metrics = MetricsService::new().unwrap();
        metrics.files_ingested(3);
        metrics.run_started();
        metrics.run_finished("SUCCEEDED");
        metrics.observe_stage(StageName::Preprocess, std::time::Duration::from_millis(30));

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("dataprep_files_ingested_total 3"));
        assert!(rendered.contains("dataprep_runs_total"));
        assert!(rendered.contains("dataprep_stage_duration_seconds"));
    }

    #[test]
    fn test_isolated_registries() {
        let a = MetricsService::new().unwrap();
        let b = MetricsService::new().unwrap();
        a.files_ingested(5);
        assert!(!b.render().unwrap().contains("dataprep_files_ingested_total 5"));
    }
}
