// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Web connector: fetches each configured seed URL as one document.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

use dataprep_pipeline_domain::entities::{DataSource, SourceType};
use dataprep_pipeline_domain::PipelineError;

use super::{guess_content_type, Connector, SourceItem};

/// Connector for WEB data sources.
#[derive(Clone)]
pub struct WebConnector {
    client: reqwest::Client,
}

impl WebConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn filename_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let last = last.split(['?', '#']).next().unwrap_or(last);
    if last.is_empty() || last.contains("://") {
        "index.html".to_string()
    } else {
        last.to_string()
    }
}

#[async_trait::async_trait]
impl Connector for WebConnector {
    fn source_type(&self) -> SourceType {
        SourceType::Web
    }

    async fn items(
        &self,
        source: &DataSource,
    ) -> Result<BoxStream<'static, Result<SourceItem, PipelineError>>, PipelineError> {
        let config = source.web_config()?;
        let client = self.client.clone();
        let timeout = Duration::from_secs(config.timeout_seconds);

        let stream = stream::iter(config.urls).then(move |url| {
            let client = client.clone();
            async move {
                let response = client
                    .get(&url)
                    .timeout(timeout)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| {
                        PipelineError::DependencyUnavailable(format!("fetch {}: {}", url, e))
                    })?;

                let filename = filename_from_url(&url);
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                    .unwrap_or_else(|| guess_content_type(&filename).to_string());

                let bytes: Bytes = response.bytes().await.map_err(|e| {
                    PipelineError::DependencyUnavailable(format!("read {}: {}", url, e))
                })?;

                Ok(SourceItem {
                    uri: url,
                    filename,
                    content_type,
                    bytes,
                })
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/docs/intro.html"),
            "intro.html"
        );
        assert_eq!(
            filename_from_url("https://example.com/docs/page?tab=2"),
            "page"
        );
        assert_eq!(filename_from_url("https://example.com/"), "index.html");
        assert_eq!(filename_from_url("https://example.com"), "index.html");
    }
}
