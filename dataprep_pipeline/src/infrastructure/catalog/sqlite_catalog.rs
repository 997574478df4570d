// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Catalog
//!
//! The transactional catalog implementation over `sqlx::SqlitePool`.
//!
//! ## Concurrency
//!
//! SQLite serializes writers, so every multi-row transition below runs as a
//! single transaction and observes the same guarantees the contract states
//! in terms of row locks: version allocation reads and `begin_run` inserts
//! cannot interleave with a concurrent finalize on the same product.
//!
//! The two run invariants are additionally backed by partial unique indexes
//! (`idx_runs_single_active`, `idx_runs_single_succeeded`), so even a bug in
//! the transactional checks cannot persist a violating row - the insert
//! surfaces as a conflict instead.
//!
//! ## Representation
//!
//! Timestamps are RFC3339 TEXT, identifiers are ULID TEXT, JSON payloads
//! (chunking config, rule sets, metrics, violation details) are serialized
//! JSON TEXT columns.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

use dataprep_pipeline_domain::entities::{
    Artifact, ArtifactType, ChunkRecord, DataSource, PipelineRun, Product, ProductStatus,
    QualityRuleSet, QualityViolation, RawFile, RawFileStatus, RuleKind, RunStatus, Severity,
    SourceType, StageExecution, StageName, StagePatch, StageStatus, TriggerReason,
};
use dataprep_pipeline_domain::repositories::{Catalog, ChunkQuery};
use dataprep_pipeline_domain::value_objects::{
    ArtifactId, BlobBucket, BlobLocation, Checksum, ChunkId, DataSourceId, ProductId, RawFileId,
    RunId, Version, WorkspaceId,
};
use dataprep_pipeline_domain::PipelineError;

use super::schema;

/// Catalog implementation backed by SQLite.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the database if needed, connects, migrates, and wraps the
    /// pool.
    pub async fn connect(dsn: &str) -> Result<Self, PipelineError> {
        let pool = schema::initialize_database(dsn)
            .await
            .map_err(|e| PipelineError::DependencyUnavailable(format!("catalog: {}", e)))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, PipelineError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::DatabaseError(format!("bad timestamp '{}': {}", s, e)))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>, PipelineError> {
    s.as_deref().map(parse_ts).transpose()
}

fn db_err(e: sqlx::Error) -> PipelineError {
    PipelineError::DatabaseError(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn trigger_reason_str(reason: &TriggerReason) -> &'static str {
    match reason {
        TriggerReason::Manual => "manual",
        TriggerReason::Retry => "retry",
        TriggerReason::Forced => "forced",
    }
}

fn parse_trigger_reason(s: &str) -> TriggerReason {
    match s {
        "retry" => TriggerReason::Retry,
        "forced" => TriggerReason::Forced,
        _ => TriggerReason::Manual,
    }
}

// ----------------------------------------------------------------------
// Row mappers
// ----------------------------------------------------------------------

fn product_from_row(row: &SqliteRow) -> Result<Product, PipelineError> {
    let chunking: String = row.try_get("chunking_config").map_err(db_err)?;
    Ok(Product {
        id: ProductId::from_str(&row.try_get::<String, _>("id").map_err(db_err)?)?,
        workspace_id: WorkspaceId::from_str(
            &row.try_get::<String, _>("workspace_id").map_err(db_err)?,
        )?,
        name: row.try_get("name").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        status: ProductStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        current_version: row.try_get::<i64, _>("current_version").map_err(db_err)? as u32,
        promoted_version: row
            .try_get::<Option<i64>, _>("promoted_version")
            .map_err(db_err)?
            .map(|v| v as u32),
        chunking_config: serde_json::from_str(&chunking)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at").map_err(db_err)?)?,
    })
}

fn data_source_from_row(row: &SqliteRow) -> Result<DataSource, PipelineError> {
    let config: String = row.try_get("config").map_err(db_err)?;
    Ok(DataSource {
        id: DataSourceId::from_str(&row.try_get::<String, _>("id").map_err(db_err)?)?,
        workspace_id: WorkspaceId::from_str(
            &row.try_get::<String, _>("workspace_id").map_err(db_err)?,
        )?,
        product_id: ProductId::from_str(
            &row.try_get::<String, _>("product_id").map_err(db_err)?,
        )?,
        source_type: SourceType::parse(
            &row.try_get::<String, _>("source_type").map_err(db_err)?,
        )?,
        config: serde_json::from_str(&config)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

fn raw_file_from_row(row: &SqliteRow) -> Result<RawFile, PipelineError> {
    Ok(RawFile {
        id: RawFileId::from_str(&row.try_get::<String, _>("id").map_err(db_err)?)?,
        workspace_id: WorkspaceId::from_str(
            &row.try_get::<String, _>("workspace_id").map_err(db_err)?,
        )?,
        product_id: ProductId::from_str(
            &row.try_get::<String, _>("product_id").map_err(db_err)?,
        )?,
        data_source_id: row
            .try_get::<Option<String>, _>("data_source_id")
            .map_err(db_err)?
            .map(|s| DataSourceId::from_str(&s))
            .transpose()?,
        version: Version::new(row.try_get::<i64, _>("version").map_err(db_err)? as u32)?,
        file_stem: row.try_get("file_stem").map_err(db_err)?,
        filename: row.try_get("filename").map_err(db_err)?,
        content_type: row.try_get("content_type").map_err(db_err)?,
        size_bytes: row.try_get::<i64, _>("size_bytes").map_err(db_err)? as u64,
        checksum: row
            .try_get::<Option<String>, _>("checksum")
            .map_err(db_err)?
            .map(|s| Checksum::from_hex(&s))
            .transpose()?,
        blob: BlobLocation::new(
            BlobBucket::parse(&row.try_get::<String, _>("blob_bucket").map_err(db_err)?)?,
            row.try_get::<String, _>("blob_key").map_err(db_err)?,
        ),
        etag: row.try_get("etag").map_err(db_err)?,
        status: RawFileStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        error_message: row.try_get("error_message").map_err(db_err)?,
        ingested_at: parse_ts(&row.try_get::<String, _>("ingested_at").map_err(db_err)?)?,
        processed_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("processed_at")
                .map_err(db_err)?,
        )?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<PipelineRun, PipelineError> {
    let snapshot: String = row.try_get("config_snapshot").map_err(db_err)?;
    Ok(PipelineRun {
        id: RunId::from_str(&row.try_get::<String, _>("id").map_err(db_err)?)?,
        workspace_id: WorkspaceId::from_str(
            &row.try_get::<String, _>("workspace_id").map_err(db_err)?,
        )?,
        product_id: ProductId::from_str(
            &row.try_get::<String, _>("product_id").map_err(db_err)?,
        )?,
        version: Version::new(row.try_get::<i64, _>("version").map_err(db_err)? as u32)?,
        status: RunStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        started_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("started_at")
                .map_err(db_err)?,
        )?,
        finished_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("finished_at")
                .map_err(db_err)?,
        )?,
        config_snapshot: serde_json::from_str(&snapshot)?,
        trigger_reason: parse_trigger_reason(
            &row.try_get::<String, _>("trigger_reason").map_err(db_err)?,
        ),
        cancel_requested: row.try_get::<i64, _>("cancel_requested").map_err(db_err)? != 0,
        error_message: row.try_get("error_message").map_err(db_err)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

fn stage_from_row(row: &SqliteRow) -> Result<StageExecution, PipelineError> {
    let metrics: String = row.try_get("metrics").map_err(db_err)?;
    Ok(StageExecution {
        run_id: RunId::from_str(&row.try_get::<String, _>("run_id").map_err(db_err)?)?,
        stage_name: StageName::parse(
            &row.try_get::<String, _>("stage_name").map_err(db_err)?,
        )?,
        status: StageStatus::parse(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        started_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("started_at")
                .map_err(db_err)?,
        )?,
        finished_at: parse_opt_ts(
            row.try_get::<Option<String>, _>("finished_at")
                .map_err(db_err)?,
        )?,
        metrics: serde_json::from_str::<BTreeMap<String, f64>>(&metrics)?,
        error_message: row.try_get("error_message").map_err(db_err)?,
    })
}

fn artifact_from_row(row: &SqliteRow) -> Result<Artifact, PipelineError> {
    Ok(Artifact {
        id: ArtifactId::from_str(&row.try_get::<String, _>("id").map_err(db_err)?)?,
        run_id: RunId::from_str(&row.try_get::<String, _>("run_id").map_err(db_err)?)?,
        stage_name: StageName::parse(
            &row.try_get::<String, _>("stage_name").map_err(db_err)?,
        )?,
        artifact_type: ArtifactType::parse(
            &row.try_get::<String, _>("artifact_type").map_err(db_err)?,
        )?,
        name: row.try_get("name").map_err(db_err)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        blob: BlobLocation::new(
            BlobBucket::parse(&row.try_get::<String, _>("blob_bucket").map_err(db_err)?)?,
            row.try_get::<String, _>("blob_key").map_err(db_err)?,
        ),
        size_bytes: row.try_get::<i64, _>("size_bytes").map_err(db_err)? as u64,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

fn chunk_record_from_row(row: &SqliteRow) -> Result<ChunkRecord, PipelineError> {
    Ok(ChunkRecord {
        id: row.try_get("id").map_err(db_err)?,
        product_id: ProductId::from_str(
            &row.try_get::<String, _>("product_id").map_err(db_err)?,
        )?,
        version: Version::new(row.try_get::<i64, _>("version").map_err(db_err)? as u32)?,
        chunk_id: ChunkId::from_string(row.try_get::<String, _>("chunk_id").map_err(db_err)?),
        source_file: row.try_get("source_file").map_err(db_err)?,
        page_number: row
            .try_get::<Option<i64>, _>("page_number")
            .map_err(db_err)?
            .map(|v| v as u32),
        section: row.try_get("section").map_err(db_err)?,
        field_name: row.try_get("field_name").map_err(db_err)?,
        score: row.try_get("score").map_err(db_err)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

fn violation_from_row(row: &SqliteRow) -> Result<QualityViolation, PipelineError> {
    let details: String = row.try_get("details").map_err(db_err)?;
    let rule_type: String = row.try_get("rule_type").map_err(db_err)?;
    let kind = match rule_type.as_str() {
        "required_fields" => RuleKind::RequiredFields,
        "duplicate_rate" => RuleKind::DuplicateRate,
        "chunk_coverage" => RuleKind::ChunkCoverage,
        "bad_extensions" => RuleKind::BadExtensions,
        "freshness" => RuleKind::Freshness,
        "file_size" => RuleKind::FileSize,
        "content_length" => RuleKind::ContentLength,
        other => {
            return Err(PipelineError::DatabaseError(format!(
                "unknown rule type '{}'",
                other
            )))
        }
    };
    Ok(QualityViolation {
        id: row.try_get("id").map_err(db_err)?,
        run_id: RunId::from_str(&row.try_get::<String, _>("run_id").map_err(db_err)?)?,
        rule_name: row.try_get("rule_name").map_err(db_err)?,
        rule_type: kind,
        severity: Severity::parse(&row.try_get::<String, _>("severity").map_err(db_err)?)?,
        message: row.try_get("message").map_err(db_err)?,
        details: serde_json::from_str(&details)?,
        affected_count: row.try_get::<i64, _>("affected_count").map_err(db_err)? as u64,
        total_count: row.try_get::<i64, _>("total_count").map_err(db_err)? as u64,
        violation_rate: row.try_get("violation_rate").map_err(db_err)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

#[async_trait]
impl Catalog for SqliteCatalog {
    // ------------------------------------------------------------------
    // Workspaces
    // ------------------------------------------------------------------

    async fn ensure_workspace(
        &self,
        id: WorkspaceId,
        name: &str,
    ) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO workspaces (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(fmt_ts(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    async fn create_product(&self, product: &Product) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "INSERT INTO products
             (id, workspace_id, name, description, status, current_version,
              promoted_version, chunking_config, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(product.id.to_string())
        .bind(product.workspace_id.to_string())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.status.as_str())
        .bind(product.current_version as i64)
        .bind(product.promoted_version.map(|v| v as i64))
        .bind(serde_json::to_string(&product.chunking_config)?)
        .bind(fmt_ts(&product.created_at))
        .bind(fmt_ts(&product.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(PipelineError::DuplicateKey(format!(
                "product name '{}' already exists in workspace",
                product.name
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, PipelineError> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| PipelineError::NotFound(format!("product {}", id)))?;
        product_from_row(&row)
    }

    async fn list_products(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<Product>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM products WHERE workspace_id = ? ORDER BY name")
            .bind(workspace_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(product_from_row).collect()
    }

    async fn update_product(&self, product: &Product) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "UPDATE products SET name = ?, description = ?, status = ?,
             current_version = ?, promoted_version = ?, chunking_config = ?,
             updated_at = ? WHERE id = ?",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.status.as_str())
        .bind(product.current_version as i64)
        .bind(product.promoted_version.map(|v| v as i64))
        .bind(serde_json::to_string(&product.chunking_config)?)
        .bind(fmt_ts(&product.updated_at))
        .bind(product.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("product {}", product.id)));
        }
        Ok(())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let active_row = sqlx::query(
            "SELECT version FROM pipeline_runs
             WHERE product_id = ? AND status IN ('QUEUED', 'RUNNING') LIMIT 1",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if let Some(row) = active_row {
            let version = row.try_get::<i64, _>("version").map_err(db_err)? as u32;
            return Err(PipelineError::RunAlreadyActive {
                product_id: id.to_string(),
                version,
            });
        }

        // Children first; the cascade is explicit so it does not depend on
        // the connection's foreign_keys pragma.
        sqlx::query(
            "DELETE FROM quality_violations WHERE run_id IN
             (SELECT id FROM pipeline_runs WHERE product_id = ?)",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "DELETE FROM stage_executions WHERE run_id IN
             (SELECT id FROM pipeline_runs WHERE product_id = ?)",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "DELETE FROM artifacts WHERE run_id IN
             (SELECT id FROM pipeline_runs WHERE product_id = ?)",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        for table in [
            "pipeline_runs",
            "chunk_records",
            "raw_files",
            "quality_rule_sets",
            "data_sources",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE product_id = ?", table))
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("product {}", id)));
        }

        tx.commit().await.map_err(db_err)
    }

    // ------------------------------------------------------------------
    // Data sources
    // ------------------------------------------------------------------

    async fn create_data_source(&self, source: &DataSource) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO data_sources
             (id, workspace_id, product_id, source_type, config, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(source.id.to_string())
        .bind(source.workspace_id.to_string())
        .bind(source.product_id.to_string())
        .bind(source.source_type.as_str())
        .bind(serde_json::to_string(&source.config)?)
        .bind(fmt_ts(&source.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_data_source(&self, id: DataSourceId) -> Result<DataSource, PipelineError> {
        let row = sqlx::query("SELECT * FROM data_sources WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| PipelineError::NotFound(format!("data source {}", id)))?;
        data_source_from_row(&row)
    }

    async fn list_data_sources(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<DataSource>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM data_sources WHERE product_id = ? ORDER BY created_at, id",
        )
        .bind(product_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(data_source_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Versions & raw files
    // ------------------------------------------------------------------

    async fn allocate_ingest_version(
        &self,
        product_id: ProductId,
    ) -> Result<u32, PipelineError> {
        // The version read and the emptiness check share one transaction;
        // a version already holding files (an earlier batch that never
        // finalized) is never handed out for a fresh batch.
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query("SELECT current_version FROM products WHERE id = ?")
            .bind(product_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| PipelineError::NotFound(format!("product {}", product_id)))?;
        let next = row.try_get::<i64, _>("current_version").map_err(db_err)? as u32 + 1;

        let occupied: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM raw_files WHERE product_id = ? AND version = ? LIMIT 1",
        )
        .bind(product_id.to_string())
        .bind(next as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if occupied.is_some() {
            return Err(PipelineError::DuplicateKey(format!(
                "version {} of product {} already holds files; \
                 pass an explicit version to append",
                next, product_id
            )));
        }
        tx.commit().await.map_err(db_err)?;
        Ok(next)
    }

    async fn register_raw_file(&self, file: &RawFile) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "INSERT INTO raw_files
             (id, workspace_id, product_id, data_source_id, version, file_stem,
              filename, content_type, size_bytes, checksum, blob_bucket,
              blob_key, etag, status, error_message, ingested_at, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.id.to_string())
        .bind(file.workspace_id.to_string())
        .bind(file.product_id.to_string())
        .bind(file.data_source_id.map(|id| id.to_string()))
        .bind(file.version.get() as i64)
        .bind(&file.file_stem)
        .bind(&file.filename)
        .bind(&file.content_type)
        .bind(file.size_bytes as i64)
        .bind(file.checksum.as_ref().map(|c| c.as_str().to_string()))
        .bind(file.blob.bucket.as_str())
        .bind(&file.blob.key)
        .bind(file.etag.as_deref())
        .bind(file.status.as_str())
        .bind(file.error_message.as_deref())
        .bind(fmt_ts(&file.ingested_at))
        .bind(file.processed_at.as_ref().map(fmt_ts))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(PipelineError::DuplicateKey(format!(
                "raw file '{}' already registered for product {} version {}",
                file.file_stem, file.product_id, file.version
            ))),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn update_raw_file(&self, file: &RawFile) -> Result<(), PipelineError> {
        let result = sqlx::query(
            "UPDATE raw_files SET size_bytes = ?, checksum = ?, etag = ?,
             status = ?, error_message = ?, processed_at = ? WHERE id = ?",
        )
        .bind(file.size_bytes as i64)
        .bind(file.checksum.as_ref().map(|c| c.as_str().to_string()))
        .bind(file.etag.as_deref())
        .bind(file.status.as_str())
        .bind(file.error_message.as_deref())
        .bind(file.processed_at.as_ref().map(fmt_ts))
        .bind(file.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("raw file {}", file.id)));
        }
        Ok(())
    }

    async fn finalize_ingest(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let now = fmt_ts(&Utc::now());

        let result = sqlx::query(
            "UPDATE products SET current_version = MAX(current_version, ?),
             updated_at = ? WHERE id = ?",
        )
        .bind(version.get() as i64)
        .bind(&now)
        .bind(product_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("product {}", product_id)));
        }

        sqlx::query(
            "UPDATE raw_files SET status = 'INGESTED'
             WHERE product_id = ? AND version = ? AND status = 'INGESTING'",
        )
        .bind(product_id.to_string())
        .bind(version.get() as i64)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn resolve_pipeline_version(
        &self,
        product_id: ProductId,
        explicit: Option<u32>,
    ) -> Result<Version, PipelineError> {
        match explicit {
            Some(requested) => {
                let present: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM raw_files
                     WHERE product_id = ? AND version = ?
                       AND status IN ('INGESTED', 'PROCESSED', 'FAILED')
                     LIMIT 1",
                )
                .bind(product_id.to_string())
                .bind(requested as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
                if present.is_some() {
                    return Version::new(requested);
                }

                let available = self
                    .versions_with_status(
                        product_id,
                        &[
                            RawFileStatus::Ingested,
                            RawFileStatus::Processed,
                            RawFileStatus::Failed,
                        ],
                    )
                    .await?;
                let latest_ingested: Option<i64> = sqlx::query_scalar(
                    "SELECT MAX(version) FROM raw_files
                     WHERE product_id = ? AND status IN ('INGESTED', 'PROCESSED')",
                )
                .bind(product_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
                Err(PipelineError::NoRawFilesForVersion {
                    product_id: product_id.to_string(),
                    requested_version: requested,
                    latest_ingested_version: latest_ingested.map(|v| v as u32),
                    available_versions: available,
                })
            }
            None => {
                let latest: Option<i64> = sqlx::query_scalar(
                    "SELECT MAX(version) FROM raw_files
                     WHERE product_id = ? AND status IN ('INGESTED', 'FAILED')",
                )
                .bind(product_id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
                match latest {
                    Some(v) => Version::new(v as u32),
                    None => Err(PipelineError::NoRawFiles {
                        product_id: product_id.to_string(),
                    }),
                }
            }
        }
    }

    async fn list_raw_files(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<Vec<RawFile>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM raw_files
             WHERE product_id = ? AND version = ? AND status != 'DELETED'
             ORDER BY filename",
        )
        .bind(product_id.to_string())
        .bind(version.get() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(raw_file_from_row).collect()
    }

    async fn get_raw_file(&self, id: RawFileId) -> Result<RawFile, PipelineError> {
        let row = sqlx::query("SELECT * FROM raw_files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| PipelineError::NotFound(format!("raw file {}", id)))?;
        raw_file_from_row(&row)
    }

    async fn versions_with_status(
        &self,
        product_id: ProductId,
        statuses: &[RawFileStatus],
    ) -> Result<Vec<u32>, PipelineError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT version FROM raw_files
             WHERE product_id = ? AND status IN ({})
             ORDER BY version",
            placeholders
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(product_id.to_string());
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let versions = query.fetch_all(&self.pool).await.map_err(db_err)?;
        Ok(versions.into_iter().map(|v| v as u32).collect())
    }

    async fn mark_version_files(
        &self,
        product_id: ProductId,
        version: Version,
        from: &[RawFileStatus],
        to: RawFileStatus,
    ) -> Result<u64, PipelineError> {
        if from.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let processed_at = if to == RawFileStatus::Processed {
            ", processed_at = ?"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE raw_files SET status = ?{} WHERE product_id = ? AND version = ?
             AND status IN ({})",
            processed_at, placeholders
        );
        let mut query = sqlx::query(&sql).bind(to.as_str());
        if to == RawFileStatus::Processed {
            query = query.bind(fmt_ts(&Utc::now()));
        }
        query = query
            .bind(product_id.to_string())
            .bind(version.get() as i64);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Pipeline runs
    // ------------------------------------------------------------------

    async fn begin_run(&self, run: &PipelineRun) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let active: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM pipeline_runs
             WHERE product_id = ? AND version = ? AND status IN ('QUEUED', 'RUNNING')
             LIMIT 1",
        )
        .bind(run.product_id.to_string())
        .bind(run.version.get() as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if active.is_some() {
            return Err(PipelineError::RunAlreadyActive {
                product_id: run.product_id.to_string(),
                version: run.version.get(),
            });
        }

        let result = sqlx::query(
            "INSERT INTO pipeline_runs
             (id, workspace_id, product_id, version, status, started_at,
              finished_at, config_snapshot, trigger_reason, cancel_requested,
              error_message, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.workspace_id.to_string())
        .bind(run.product_id.to_string())
        .bind(run.version.get() as i64)
        .bind(run.status.as_str())
        .bind(run.started_at.as_ref().map(fmt_ts))
        .bind(run.finished_at.as_ref().map(fmt_ts))
        .bind(serde_json::to_string(&run.config_snapshot)?)
        .bind(trigger_reason_str(&run.trigger_reason))
        .bind(run.cancel_requested as i64)
        .bind(run.error_message.as_deref())
        .bind(fmt_ts(&run.created_at))
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => tx.commit().await.map_err(db_err),
            // The partial unique index backs the transactional check.
            Err(e) if is_unique_violation(&e) => Err(PipelineError::RunAlreadyActive {
                product_id: run.product_id.to_string(),
                version: run.version.get(),
            }),
            Err(e) => Err(db_err(e)),
        }
    }

    async fn get_run(&self, id: RunId) -> Result<PipelineRun, PipelineError> {
        let row = sqlx::query("SELECT * FROM pipeline_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| PipelineError::NotFound(format!("run {}", id)))?;
        run_from_row(&row)
    }

    async fn list_runs(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<PipelineRun>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM pipeline_runs WHERE product_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(product_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(run_from_row).collect()
    }

    async fn has_succeeded_run(
        &self,
        product_id: ProductId,
        version: Version,
    ) -> Result<bool, PipelineError> {
        let present: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM pipeline_runs
             WHERE product_id = ? AND version = ? AND status = 'SUCCEEDED' LIMIT 1",
        )
        .bind(product_id.to_string())
        .bind(version.get() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(present.is_some())
    }

    async fn latest_succeeded_run(
        &self,
        product_id: ProductId,
    ) -> Result<Option<PipelineRun>, PipelineError> {
        let row = sqlx::query(
            "SELECT * FROM pipeline_runs
             WHERE product_id = ? AND status = 'SUCCEEDED'
             ORDER BY version DESC, finished_at DESC LIMIT 1",
        )
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn transition_run(
        &self,
        id: RunId,
        from: RunStatus,
        to: RunStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let set_started = to == RunStatus::Running;
        let set_finished = to.is_terminal();
        let sql = format!(
            "UPDATE pipeline_runs SET status = ?{}{} WHERE id = ? AND status = ?",
            if set_started { ", started_at = ?" } else { "" },
            if set_finished { ", finished_at = ?" } else { "" },
        );
        let mut query = sqlx::query(&sql).bind(to.as_str());
        if set_started {
            query = query.bind(fmt_ts(&now));
        }
        if set_finished {
            query = query.bind(fmt_ts(&now));
        }
        let result = query
            .bind(id.to_string())
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            let current = self.get_run(id).await?;
            return Err(PipelineError::Conflict(format!(
                "run {} is {}, expected {}",
                id,
                current.status.as_str(),
                from.as_str()
            )));
        }
        Ok(())
    }

    async fn request_cancel(&self, id: RunId) -> Result<bool, PipelineError> {
        let result = sqlx::query(
            "UPDATE pipeline_runs SET cancel_requested = 1
             WHERE id = ? AND status IN ('QUEUED', 'RUNNING')",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguish "already terminal" from "no such run".
        let _ = self.get_run(id).await?;
        Ok(false)
    }

    async fn claim_queued_run(&self) -> Result<Option<PipelineRun>, PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query(
            "SELECT id FROM pipeline_runs WHERE status = 'QUEUED'
             ORDER BY created_at, id LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id").map_err(db_err)?;

        let claimed = sqlx::query(
            "UPDATE pipeline_runs SET status = 'RUNNING', started_at = ?
             WHERE id = ? AND status = 'QUEUED'",
        )
        .bind(fmt_ts(&Utc::now()))
        .bind(&id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if claimed.rows_affected() == 0 {
            return Ok(None);
        }
        tx.commit().await.map_err(db_err)?;

        Ok(Some(self.get_run(RunId::from_str(&id)?).await?))
    }

    async fn set_run_error(&self, id: RunId, message: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE pipeline_runs SET error_message = ? WHERE id = ?")
            .bind(message)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Stage executions
    // ------------------------------------------------------------------

    async fn upsert_stage(
        &self,
        run_id: RunId,
        stage: StageName,
        patch: StagePatch,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing = sqlx::query(
            "SELECT * FROM stage_executions WHERE run_id = ? AND stage_name = ?",
        )
        .bind(run_id.to_string())
        .bind(stage.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut execution = match existing {
            Some(row) => stage_from_row(&row)?,
            None => StageExecution::pending(run_id, stage),
        };
        if let Some(status) = patch.status {
            execution.status = status;
        }
        if patch.started_at.is_some() {
            execution.started_at = patch.started_at;
        }
        if patch.finished_at.is_some() {
            execution.finished_at = patch.finished_at;
        }
        if let Some(metrics) = patch.metrics {
            execution.metrics = metrics;
        }
        if patch.error_message.is_some() {
            execution.error_message = patch.error_message;
        }

        sqlx::query(
            "INSERT INTO stage_executions
             (run_id, stage_name, status, started_at, finished_at, metrics, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (run_id, stage_name) DO UPDATE SET
               status = excluded.status,
               started_at = excluded.started_at,
               finished_at = excluded.finished_at,
               metrics = excluded.metrics,
               error_message = excluded.error_message",
        )
        .bind(run_id.to_string())
        .bind(stage.as_str())
        .bind(execution.status.as_str())
        .bind(execution.started_at.as_ref().map(fmt_ts))
        .bind(execution.finished_at.as_ref().map(fmt_ts))
        .bind(serde_json::to_string(&execution.metrics)?)
        .bind(execution.error_message.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn list_stages(&self, run_id: RunId) -> Result<Vec<StageExecution>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM stage_executions WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut stages = rows
            .iter()
            .map(stage_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        stages.sort_by_key(|s| {
            StageName::DAG
                .iter()
                .position(|n| *n == s.stage_name)
                .unwrap_or(usize::MAX)
        });
        Ok(stages)
    }

    // ------------------------------------------------------------------
    // Artifacts & chunk records
    // ------------------------------------------------------------------

    async fn insert_artifact(&self, artifact: &Artifact) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT INTO artifacts
             (id, run_id, stage_name, artifact_type, name, display_name,
              blob_bucket, blob_key, size_bytes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(artifact.id.to_string())
        .bind(artifact.run_id.to_string())
        .bind(artifact.stage_name.as_str())
        .bind(artifact.artifact_type.as_str())
        .bind(&artifact.name)
        .bind(artifact.display_name.as_deref())
        .bind(artifact.blob.bucket.as_str())
        .bind(&artifact.blob.key)
        .bind(artifact.size_bytes as i64)
        .bind(fmt_ts(&artifact.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_artifact(&self, id: ArtifactId) -> Result<Artifact, PipelineError> {
        let row = sqlx::query("SELECT * FROM artifacts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| PipelineError::NotFound(format!("artifact {}", id)))?;
        artifact_from_row(&row)
    }

    async fn list_artifacts(&self, run_id: RunId) -> Result<Vec<Artifact>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM artifacts WHERE run_id = ? ORDER BY created_at, id",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(artifact_from_row).collect()
    }

    async fn upsert_chunk_records(
        &self,
        records: &[ChunkRecord],
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for record in records {
            sqlx::query(
                "INSERT INTO chunk_records
                 (id, product_id, version, chunk_id, source_file, page_number,
                  section, field_name, score, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (product_id, version, chunk_id) DO UPDATE SET
                   source_file = excluded.source_file,
                   page_number = excluded.page_number,
                   section = excluded.section,
                   field_name = excluded.field_name,
                   score = excluded.score",
            )
            .bind(&record.id)
            .bind(record.product_id.to_string())
            .bind(record.version.get() as i64)
            .bind(record.chunk_id.as_str())
            .bind(&record.source_file)
            .bind(record.page_number.map(|p| p as i64))
            .bind(record.section.as_deref())
            .bind(record.field_name.as_deref())
            .bind(record.score)
            .bind(fmt_ts(&record.created_at))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn query_chunk_records(
        &self,
        query: &ChunkQuery,
    ) -> Result<Vec<ChunkRecord>, PipelineError> {
        let mut sql = String::from(
            "SELECT * FROM chunk_records WHERE product_id = ? AND version = ?",
        );
        if query.section.is_some() {
            sql.push_str(" AND section = ?");
        }
        if query.field_name.is_some() {
            sql.push_str(" AND field_name = ?");
        }
        sql.push_str(" ORDER BY source_file, chunk_id LIMIT ? OFFSET ?");

        let mut q = sqlx::query(&sql)
            .bind(query.product_id.to_string())
            .bind(query.version.get() as i64);
        if let Some(section) = &query.section {
            q = q.bind(section);
        }
        if let Some(field) = &query.field_name {
            q = q.bind(field);
        }
        q = q.bind(query.limit as i64).bind(query.offset as i64);

        let rows = q.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(chunk_record_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Quality rules & violations
    // ------------------------------------------------------------------

    async fn get_rule_set(
        &self,
        product_id: ProductId,
    ) -> Result<QualityRuleSet, PipelineError> {
        let row = sqlx::query(
            "SELECT rules FROM quality_rule_sets WHERE product_id = ?
             ORDER BY version DESC LIMIT 1",
        )
        .bind(product_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => {
                let rules: String = row.try_get("rules").map_err(db_err)?;
                Ok(serde_json::from_str(&rules)?)
            }
            None => Ok(QualityRuleSet::empty(product_id)),
        }
    }

    async fn put_rule_set(&self, set: &QualityRuleSet) -> Result<u32, PipelineError> {
        set.validate()?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM quality_rule_sets WHERE product_id = ?",
        )
        .bind(set.product_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let next_version = (latest.unwrap_or(0) as u32) + 1;

        let mut stored = set.clone();
        stored.version = next_version;
        sqlx::query(
            "INSERT INTO quality_rule_sets (product_id, version, rules, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(set.product_id.to_string())
        .bind(next_version as i64)
        .bind(serde_json::to_string(&stored)?)
        .bind(fmt_ts(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(next_version)
    }

    async fn insert_violations(
        &self,
        violations: &[QualityViolation],
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for v in violations {
            sqlx::query(
                "INSERT INTO quality_violations
                 (id, run_id, rule_name, rule_type, severity, message, details,
                  affected_count, total_count, violation_rate, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&v.id)
            .bind(v.run_id.to_string())
            .bind(&v.rule_name)
            .bind(v.rule_type.as_str())
            .bind(v.severity.as_str())
            .bind(&v.message)
            .bind(serde_json::to_string(&v.details)?)
            .bind(v.affected_count as i64)
            .bind(v.total_count as i64)
            .bind(v.violation_rate)
            .bind(fmt_ts(&v.created_at))
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn list_violations(
        &self,
        product_id: ProductId,
        version: Option<Version>,
    ) -> Result<Vec<QualityViolation>, PipelineError> {
        let mut sql = String::from(
            "SELECT v.* FROM quality_violations v
             JOIN pipeline_runs r ON r.id = v.run_id
             WHERE r.product_id = ?",
        );
        if version.is_some() {
            sql.push_str(" AND r.version = ?");
        }
        sql.push_str(" ORDER BY v.created_at DESC, v.id");

        let mut q = sqlx::query(&sql).bind(product_id.to_string());
        if let Some(v) = version {
            q = q.bind(v.get() as i64);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(violation_from_row).collect()
    }
}
