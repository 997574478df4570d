// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Connectors
//!
//! One connector per data-source type pulls raw items for ingestion. A
//! connector yields a stream of [`SourceItem`]s; the ingest coordinator owns
//! registration, upload, and failure bookkeeping, so connectors stay pure
//! fetchers.
//!
//! ## File stems
//!
//! Every item carries a canonical URI, and [`file_stem_from_uri`] derives
//! the stable identity used for dedup: the same source item ingested twice
//! under the same version produces the same stem and is skipped the second
//! time. The stem is a slug of the URI plus a short content-independent
//! hash of the full URI, so two URIs that slug identically still get
//! distinct stems.

use bytes::Bytes;
use futures::stream::BoxStream;
use sha2::{Digest, Sha256};

use dataprep_pipeline_domain::entities::{DataSource, SourceType};
use dataprep_pipeline_domain::PipelineError;

pub mod database;
pub mod folder;
pub mod web;

pub use database::DatabaseConnector;
pub use folder::FolderConnector;
pub use web::WebConnector;

/// One raw item pulled from a source.
#[derive(Debug, Clone)]
pub struct SourceItem {
    /// Canonical URI, stable across runs.
    pub uri: String,
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A pull-based source of raw items.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Source type this connector serves.
    fn source_type(&self) -> SourceType;

    /// Opens the source and streams its items. Per-item failures are
    /// yielded inline so one bad item does not end the stream.
    async fn items(
        &self,
        source: &DataSource,
    ) -> Result<BoxStream<'static, Result<SourceItem, PipelineError>>, PipelineError>;
}

/// Derives the stable file stem for a canonical URI.
pub fn file_stem_from_uri(uri: &str) -> String {
    let mut slug = String::with_capacity(uri.len().min(64));
    let mut last_dash = true;
    for c in uri.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 48 {
            break;
        }
    }
    let slug = slug.trim_matches('-');

    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    let digest = hex::encode(&hasher.finalize()[..4]);

    if slug.is_empty() {
        digest
    } else {
        format!("{}-{}", slug, digest)
    }
}

/// Best-effort MIME type from a filename extension.
pub fn guess_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().unwrap_or("") {
        "html" | "htm" => "text/html",
        "md" | "markdown" => "text/markdown",
        "txt" => "text/plain",
        "json" => "application/json",
        "jsonl" | "ndjson" => "application/x-ndjson",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_is_stable() {
        let a = file_stem_from_uri("https://example.com/docs/intro.html");
        let b = file_stem_from_uri("https://example.com/docs/intro.html");
        assert_eq!(a, b);
    }

    #[test]
    fn test_file_stem_distinguishes_slug_collisions() {
        let a = file_stem_from_uri("https://example.com/a?b");
        let b = file_stem_from_uri("https://example.com/a-b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_stem_of_unfriendly_uri() {
        let stem = file_stem_from_uri("///???///");
        assert!(!stem.is_empty());
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_type_guessing() {
        assert_eq!(guess_content_type("report.pdf"), "application/pdf");
        assert_eq!(guess_content_type("index.html"), "text/html");
        assert_eq!(guess_content_type("blob"), "application/octet-stream");
    }
}
