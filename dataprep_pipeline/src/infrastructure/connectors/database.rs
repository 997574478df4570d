// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Database connector: exports query rows as one JSON document each.
//!
//! Supports `sqlite://` DSNs, the driver already in the build; other
//! engines are rejected at config time rather than silently skipped.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use sqlx::{Column, Row, SqlitePool};

use dataprep_pipeline_domain::entities::{DataSource, SourceType};
use dataprep_pipeline_domain::PipelineError;

use super::{Connector, SourceItem};

/// Connector for DATABASE data sources.
#[derive(Clone, Default)]
pub struct DatabaseConnector;

impl DatabaseConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Decodes a dynamically-typed SQLite column into JSON.
fn column_value(row: &sqlx::sqlite::SqliteRow, index: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Into::into).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(|f| serde_json::Number::from_f64(f).map(serde_json::Value::Number))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
    }
    serde_json::Value::Null
}

#[async_trait::async_trait]
impl Connector for DatabaseConnector {
    fn source_type(&self) -> SourceType {
        SourceType::Database
    }

    async fn items(
        &self,
        source: &DataSource,
    ) -> Result<BoxStream<'static, Result<SourceItem, PipelineError>>, PipelineError> {
        let config = source.database_config()?;
        if !config.dsn.starts_with("sqlite:") {
            return Err(PipelineError::InvalidConfiguration(format!(
                "unsupported database DSN '{}': only sqlite is supported",
                config.dsn
            )));
        }

        let pool = SqlitePool::connect(&config.dsn).await.map_err(|e| {
            PipelineError::DependencyUnavailable(format!("connect {}: {}", config.dsn, e))
        })?;
        let rows = sqlx::query(&config.query)
            .fetch_all(&pool)
            .await
            .map_err(|e| {
                PipelineError::InvalidConfiguration(format!(
                    "source query failed: {}",
                    e
                ))
            })?;
        pool.close().await;

        let mut items = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let mut document = serde_json::Map::new();
            let mut row_id: Option<String> = None;
            for (i, column) in row.columns().iter().enumerate() {
                let value = column_value(row, i);
                if column.name() == config.id_column {
                    row_id = match &value {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    };
                }
                document.insert(column.name().to_string(), value);
            }
            let row_id = row_id.unwrap_or_else(|| format!("row-{}", row_index));
            let body = serde_json::Value::Object(document);
            items.push(Ok(SourceItem {
                uri: format!("{}#{}", config.dsn, row_id),
                filename: format!("{}.json", row_id),
                content_type: "application/json".to_string(),
                bytes: Bytes::from(serde_json::to_vec(&body).map_err(PipelineError::from)?),
            }));
        }

        Ok(stream::iter(items).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataprep_pipeline_domain::value_objects::{ProductId, WorkspaceId};
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_rows_export_as_json_documents() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let dsn = format!("sqlite://{}", temp.path().display());
        let pool = SqlitePool::connect(&dsn).await.unwrap();
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, title TEXT, body TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO notes VALUES (1, 'first', 'alpha'), (2, 'second', 'beta')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let source = DataSource::new(
            WorkspaceId::new(),
            ProductId::new(),
            SourceType::Database,
            json!({
                "dsn": dsn,
                "query": "SELECT id, title, body FROM notes ORDER BY id",
                "id_column": "id"
            }),
        )
        .unwrap();

        let items: Vec<SourceItem> = DatabaseConnector::new()
            .items(&source)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].filename, "1.json");
        let doc: serde_json::Value = serde_json::from_slice(&items[0].bytes).unwrap();
        assert_eq!(doc["title"], "first");
    }

    #[tokio::test]
    async fn test_non_sqlite_dsn_rejected() {
        let source = DataSource::new(
            WorkspaceId::new(),
            ProductId::new(),
            SourceType::Database,
            json!({
                "dsn": "postgres://localhost/db",
                "query": "SELECT 1",
                "id_column": "id"
            }),
        )
        .unwrap();
        let err = DatabaseConnector::new().items(&source).await;
        assert!(err.is_err());
    }
}
