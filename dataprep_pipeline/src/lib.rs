// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Dataprep Pipeline
//!
//! Versioned ingestion and staged preparation for tenant-scoped document
//! products. Source documents flow from connectors into an immutable
//! versioned raw-file catalog, through the fixed preparation DAG
//! (preprocess → scoring → fingerprint → validation → policy → reporting →
//! indexing → validate_quality → finalize), and out to retrieval stores as
//! chunks and vector embeddings - with full lineage from raw bytes to
//! indexed vector.
//!
//! ## Layers
//!
//! - [`application`] - ingest coordinator, pipeline orchestrator, worker
//!   pool, reconciliation, and the `Services` bundle
//! - [`infrastructure`] - SQLite catalog, S3 blob gateway, connectors,
//!   embedding and vector store clients, metrics, configuration, and the
//!   nine stage implementations
//! - [`presentation`] - the HTTP control API
//!
//! Domain types live in the `dataprep-pipeline-domain` crate; process
//! bootstrap (logging, shutdown, exit codes) in
//! `dataprep-pipeline-bootstrap`.

pub mod application;
pub mod infrastructure;
pub mod presentation;
