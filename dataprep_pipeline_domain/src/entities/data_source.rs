// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Data Source Entity
//!
//! A data source describes *how* to pull raw bytes for a product: a web
//! crawl seed list, a folder on disk, or a database export. The config is
//! opaque per type at the catalog level and parsed into its typed form by
//! the matching connector at ingest time; it is immutable for the duration
//! of an ingest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{DataSourceId, ProductId, WorkspaceId};
use crate::PipelineError;

/// Kind of source a connector pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Web,
    Folder,
    Database,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Web => "WEB",
            SourceType::Folder => "FOLDER",
            SourceType::Database => "DATABASE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "WEB" => Ok(SourceType::Web),
            "FOLDER" => Ok(SourceType::Folder),
            "DATABASE" => Ok(SourceType::Database),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown source type '{}'",
                other
            ))),
        }
    }
}

/// Typed form of a WEB source config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSourceConfig {
    /// Seed URLs fetched one document each.
    pub urls: Vec<String>,
    #[serde(default = "default_web_timeout")]
    pub timeout_seconds: u64,
}

fn default_web_timeout() -> u64 {
    30
}

/// Typed form of a FOLDER source config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSourceConfig {
    pub path: String,
    /// Lowercase extensions to include; empty means all files.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Typed form of a DATABASE source config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSourceConfig {
    pub dsn: String,
    pub query: String,
    /// Column whose value names each exported row document.
    pub id_column: String,
}

/// Data source entity: the catalog row with its opaque config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: DataSourceId,
    pub workspace_id: WorkspaceId,
    pub product_id: ProductId,
    pub source_type: SourceType,
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DataSource {
    /// Creates a data source after validating the config against its type.
    pub fn new(
        workspace_id: WorkspaceId,
        product_id: ProductId,
        source_type: SourceType,
        config: serde_json::Value,
    ) -> Result<Self, PipelineError> {
        validate_config(source_type, &config)?;
        Ok(Self {
            id: DataSourceId::new(),
            workspace_id,
            product_id,
            source_type,
            config,
            created_at: Utc::now(),
        })
    }

    pub fn web_config(&self) -> Result<WebSourceConfig, PipelineError> {
        parse_config(self.source_type, SourceType::Web, &self.config)
    }

    pub fn folder_config(&self) -> Result<FolderSourceConfig, PipelineError> {
        parse_config(self.source_type, SourceType::Folder, &self.config)
    }

    pub fn database_config(&self) -> Result<DatabaseSourceConfig, PipelineError> {
        parse_config(self.source_type, SourceType::Database, &self.config)
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(
    actual: SourceType,
    expected: SourceType,
    config: &serde_json::Value,
) -> Result<T, PipelineError> {
    if actual != expected {
        return Err(PipelineError::InvalidInput(format!(
            "source is {} but {} config was requested",
            actual.as_str(),
            expected.as_str()
        )));
    }
    serde_json::from_value(config.clone()).map_err(|e| {
        PipelineError::InvalidInput(format!(
            "invalid {} source config: {}",
            expected.as_str(),
            e
        ))
    })
}

/// Validates an opaque config against its declared type.
pub fn validate_config(
    source_type: SourceType,
    config: &serde_json::Value,
) -> Result<(), PipelineError> {
    match source_type {
        SourceType::Web => {
            let parsed: WebSourceConfig = serde_json::from_value(config.clone())
                .map_err(|e| PipelineError::InvalidInput(format!("invalid WEB config: {}", e)))?;
            if parsed.urls.is_empty() {
                return Err(PipelineError::InvalidInput(
                    "WEB config requires at least one url".into(),
                ));
            }
        }
        SourceType::Folder => {
            let parsed: FolderSourceConfig = serde_json::from_value(config.clone())
                .map_err(|e| {
                    PipelineError::InvalidInput(format!("invalid FOLDER config: {}", e))
                })?;
            if parsed.path.trim().is_empty() {
                return Err(PipelineError::InvalidInput(
                    "FOLDER config requires a path".into(),
                ));
            }
        }
        SourceType::Database => {
            let parsed: DatabaseSourceConfig = serde_json::from_value(config.clone())
                .map_err(|e| {
                    PipelineError::InvalidInput(format!("invalid DATABASE config: {}", e))
                })?;
            if parsed.dsn.trim().is_empty() || parsed.query.trim().is_empty() {
                return Err(PipelineError::InvalidInput(
                    "DATABASE config requires dsn and query".into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_web_config_requires_urls() {
        let err = DataSource::new(
            WorkspaceId::new(),
            ProductId::new(),
            SourceType::Web,
            json!({ "urls": [] }),
        );
        assert!(err.is_err());

        let ok = DataSource::new(
            WorkspaceId::new(),
            ProductId::new(),
            SourceType::Web,
            json!({ "urls": ["https://example.com/doc"] }),
        )
        .unwrap();
        assert_eq!(ok.web_config().unwrap().timeout_seconds, 30);
    }

    #[test]
    fn test_config_type_mismatch_rejected() {
        let ds = DataSource::new(
            WorkspaceId::new(),
            ProductId::new(),
            SourceType::Folder,
            json!({ "path": "/var/corpus" }),
        )
        .unwrap();
        assert!(ds.web_config().is_err());
        assert_eq!(ds.folder_config().unwrap().path, "/var/corpus");
    }

    #[test]
    fn test_database_config_requires_dsn_and_query() {
        let err = validate_config(
            SourceType::Database,
            &json!({ "dsn": "", "query": "SELECT 1", "id_column": "id" }),
        );
        assert!(err.is_err());
    }
}
