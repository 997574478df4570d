// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite schema helpers for the catalog.
//!
//! Applies migrations on start-up so integration tests and services see a
//! consistent database.

use sqlx::migrate::MigrateDatabase;
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Runs pending migrations against the provided SQLite pool.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("ensuring catalog schema is up to date");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("catalog schema is up to date");
    Ok(())
}

/// Creates the SQLite database file if it doesn't exist.
///
/// `SqlitePool::connect` fails on a missing file; calling this first keeps
/// first-run setup a single code path.
pub async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    if !sqlx::Sqlite::database_exists(database_url).await? {
        debug!(url = database_url, "catalog database missing, creating");
        sqlx::Sqlite::create_database(database_url).await?;
        info!(url = database_url, "created catalog database");
    }
    Ok(())
}

/// Creates the database if needed, connects, and migrates.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    create_database_if_missing(database_url).await?;
    let pool = SqlitePool::connect(database_url).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_create_database_if_missing() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap().to_string();
        let db_url = format!("sqlite://{}", db_path);
        drop(temp);

        create_database_if_missing(&db_url).await.unwrap();
        // Idempotent on an existing file.
        create_database_if_missing(&db_url).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_database() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap().to_string();
        let db_url = format!("sqlite://{}", db_path);
        drop(temp);

        let pool = initialize_database(&db_url).await.unwrap();

        let count: i32 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='pipeline_runs'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "pipeline_runs table should exist");
    }

    #[tokio::test]
    async fn test_ensure_schema_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap().to_string();
        let db_url = format!("sqlite://{}", db_path);
        drop(temp);

        create_database_if_missing(&db_url).await.unwrap();
        let pool = SqlitePool::connect(&db_url).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }
}
