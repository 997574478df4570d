// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! Closed-key-set configuration loaded in three layers with increasing
//! precedence: built-in defaults, an optional TOML file, and `DATAPREP_*`
//! environment overrides (`DATAPREP_CATALOG__DSN`, double underscore as the
//! section separator).
//!
//! The key set is closed: deserialization rejects unknown keys in every
//! section, so a typo like `pipeline.worker` fails at startup instead of
//! silently running with the default.
//!
//! ## Recognized keys
//!
//! ```toml
//! [catalog]
//! dsn = "sqlite://dataprep.db"
//!
//! [blob]
//! endpoint = "http://127.0.0.1:9000"
//! region = "us-east-1"
//! access_key = "..."
//! secret_key = "..."
//!
//! [vector]
//! endpoint = "http://127.0.0.1:6333"
//! api_key = "..."
//!
//! [embedding]
//! endpoint = "https://models.example.com/v1/embeddings"
//! api_key = "..."
//! model = "content-embed-1"
//! dimension = 256
//!
//! [pipeline]
//! workers = 4                       # default: CPU count
//! stage_timeout_seconds = 3600
//!
//! [pipeline.indexing]
//! failure_ratio_threshold = 0.05
//!
//! [ingest]
//! concurrency_per_source = 8
//!
//! [auth]
//! public_key_pem = "-----BEGIN PUBLIC KEY-----..."
//!
//! [api]
//! bind_addr = "0.0.0.0:8080"
//!
//! [log]
//! level = "info"
//! format = "text"                   # or "json"
//! ```

use config::{Config, Environment, File};
use serde::Deserialize;

use dataprep_pipeline_domain::services::stage::PipelineTuning;
use dataprep_pipeline_domain::PipelineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CatalogConfig {
    /// Catalog DB connection string; `sqlite://` DSNs are supported.
    pub dsn: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dsn: "sqlite://dataprep.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct BlobConfig {
    /// Custom S3 endpoint (MinIO and friends); AWS default when unset.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct VectorConfig {
    /// Vector store REST endpoint; the in-memory index is used when unset.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    /// Embedding provider endpoint; the deterministic local embedder is
    /// used when unset.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "local-hash".to_string(),
            dimension: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IndexingConfig {
    /// Tolerated embedding failure ratio before the indexing stage fails.
    pub failure_ratio_threshold: f64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Number of concurrent pipeline runs.
    pub workers: usize,
    /// Per-stage deadline in seconds.
    pub stage_timeout_seconds: u64,
    pub indexing: IndexingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            stage_timeout_seconds: 3600,
            indexing: IndexingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IngestConfig {
    /// Bounded fan-out width per data source.
    pub concurrency_per_source: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency_per_source: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct AuthConfig {
    /// PEM public key verifying bearer tokens; token verification falls
    /// back to the static dev verifier when unset.
    pub public_key_pem: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApiConfig {
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// The application configuration tree.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub blob: BlobConfig,
    pub vector: VectorConfig,
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineConfig,
    pub ingest: IngestConfig,
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// Loads defaults, then the optional file, then `DATAPREP_*` env vars.
    pub fn load(file: Option<&str>) -> Result<Self, PipelineError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("DATAPREP")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder
            .build()
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?;
        let cfg: AppConfig = raw
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Cross-field validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.pipeline.workers == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "pipeline.workers must be at least 1".into(),
            ));
        }
        if self.pipeline.stage_timeout_seconds == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "pipeline.stage_timeout_seconds must be positive".into(),
            ));
        }
        let threshold = self.pipeline.indexing.failure_ratio_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidConfiguration(
                "pipeline.indexing.failure_ratio_threshold must be within 0-1".into(),
            ));
        }
        if self.ingest.concurrency_per_source == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "ingest.concurrency_per_source must be at least 1".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "embedding.dimension must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The per-run tunables snapshot derived from this config.
    pub fn tuning(&self) -> PipelineTuning {
        PipelineTuning {
            stage_timeout_seconds: self.pipeline.stage_timeout_seconds,
            indexing_failure_ratio_threshold: self.pipeline.indexing.failure_ratio_threshold,
            chunk_concurrency: self.ingest.concurrency_per_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.pipeline.stage_timeout_seconds, 3600);
        assert!((cfg.pipeline.indexing.failure_ratio_threshold - 0.05).abs() < 1e-9);
        assert_eq!(cfg.ingest.concurrency_per_source, 8);
        assert_eq!(cfg.api.bind_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let toml = r#"
            [pipeline]
            worker = 4
        "#;
        let raw = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let result: Result<AppConfig, _> = raw.try_deserialize();
        assert!(result.is_err());
    }

    #[test]
    fn test_file_values_parsed() {
        let toml = r#"
            [catalog]
            dsn = "sqlite://test.db"

            [pipeline]
            workers = 3

            [pipeline.indexing]
            failure_ratio_threshold = 0.2
        "#;
        let raw = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        let cfg: AppConfig = raw.try_deserialize().unwrap();
        assert_eq!(cfg.catalog.dsn, "sqlite://test.db");
        assert_eq!(cfg.pipeline.workers, 3);
        assert!((cfg.pipeline.indexing.failure_ratio_threshold - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut cfg = AppConfig::default();
        cfg.pipeline.indexing.failure_ratio_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}
