// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Folder connector: recursive directory walk, one item per regular file.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::PathBuf;

use dataprep_pipeline_domain::entities::{DataSource, SourceType};
use dataprep_pipeline_domain::PipelineError;

use super::{guess_content_type, Connector, SourceItem};

/// Connector for FOLDER data sources.
#[derive(Clone, Default)]
pub struct FolderConnector;

impl FolderConnector {
    pub fn new() -> Self {
        Self
    }

    /// Collects matching file paths depth-first, sorted for determinism.
    async fn collect_paths(
        root: &PathBuf,
        extensions: &[String],
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let mut found = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
                PipelineError::IoError(format!("read dir {}: {}", dir.display(), e))
            })?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                PipelineError::IoError(format!("read dir {}: {}", dir.display(), e))
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| {
                    PipelineError::IoError(format!("stat {}: {}", path.display(), e))
                })?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && Self::extension_matches(&path, extensions) {
                    found.push(path);
                }
            }
        }
        found.sort();
        Ok(found)
    }

    fn extension_matches(path: &PathBuf, extensions: &[String]) -> bool {
        if extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&e))
            })
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl Connector for FolderConnector {
    fn source_type(&self) -> SourceType {
        SourceType::Folder
    }

    async fn items(
        &self,
        source: &DataSource,
    ) -> Result<BoxStream<'static, Result<SourceItem, PipelineError>>, PipelineError> {
        let config = source.folder_config()?;
        let root = PathBuf::from(&config.path);
        let paths = Self::collect_paths(&root, &config.extensions).await?;

        let stream = stream::iter(paths).then(|path| async move {
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                PipelineError::IoError(format!("read {}: {}", path.display(), e))
            })?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unnamed")
                .to_string();
            Ok(SourceItem {
                uri: format!("file://{}", path.display()),
                content_type: guess_content_type(&filename).to_string(),
                filename,
                bytes: Bytes::from(bytes),
            })
        });
        Ok(stream.boxed())
    }
}
