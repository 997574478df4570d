// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Preprocess Stage
//!
//! Fetches the version's raw files from the catalog, verifies each against
//! the blob store (head check; a missing blob or ETag mismatch marks the
//! file FAILED and drops it from the batch without aborting), applies the
//! playbook, and cuts chunks with stable ids. Chunks land as JSONL in the
//! `clean` bucket and as catalog chunk records.
//!
//! The stage fails only when zero chunks were produced; anything else is a
//! per-file outcome captured in metrics.

use async_trait::async_trait;
use chrono::Utc;
use ulid::Ulid;

use dataprep_pipeline_domain::entities::{
    ArtifactDraft, ArtifactType, ChunkRecord, ChunkingConfig, RawFile, RawFileStatus, StageName,
};
use dataprep_pipeline_domain::services::{
    Playbook, RunBlackboard, Stage, StageContext, StageOutcome,
};
use dataprep_pipeline_domain::value_objects::{BlobLocation, Chunk, ChunkId};
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog};
use dataprep_pipeline_domain::PipelineError;

use super::text;

/// Stage implementation for `preprocess`.
pub struct PreprocessStage;

#[async_trait]
impl Stage for PreprocessStage {
    fn name(&self) -> StageName {
        StageName::Preprocess
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        let files = ctx
            .catalog
            .list_raw_files(ctx.product_id, ctx.version)
            .await?;
        let batch: Vec<&RawFile> = files
            .iter()
            .filter(|f| {
                matches!(
                    f.status,
                    RawFileStatus::Ingested | RawFileStatus::Processing | RawFileStatus::Processed
                )
            })
            .collect();

        ctx.catalog
            .mark_version_files(
                ctx.product_id,
                ctx.version,
                &[RawFileStatus::Ingested, RawFileStatus::Processed],
                RawFileStatus::Processing,
            )
            .await?;

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut integrity_failures: u64 = 0;
        let mut read_failures: u64 = 0;

        for file in &batch {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled("preprocess".into()));
            }
            match verify_file(ctx, file).await {
                Ok(()) => {}
                Err(PipelineError::IntegrityMismatch { .. })
                | Err(PipelineError::NotFound(_)) => {
                    integrity_failures += 1;
                    let mut failed = (*file).clone();
                    failed.fail("blob integrity check failed");
                    ctx.catalog.update_raw_file(&failed).await?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            match ctx.blob.get(&file.blob).await {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let file_chunks =
                        chunk_document(ctx, &ctx.playbook, &ctx.chunking, file, &text);
                    chunks.extend(file_chunks);
                }
                Err(_) => {
                    read_failures += 1;
                    let mut failed = (*file).clone();
                    failed.fail("blob read failed");
                    ctx.catalog.update_raw_file(&failed).await?;
                }
            }
        }

        if chunks.is_empty() {
            return Ok(StageOutcome::failed("no chunks produced from raw files")
                .with_metric("files_total_count", batch.len() as f64)
                .with_metric("files_integrity_failed_count", integrity_failures as f64)
                .with_metric("files_read_failed_count", read_failures as f64));
        }

        // Persist the chunk set as JSONL, one chunk per line.
        let mut jsonl = Vec::new();
        for chunk in &chunks {
            serde_json::to_writer(&mut jsonl, chunk)?;
            jsonl.push(b'\n');
        }
        let location = BlobLocation::chunks_jsonl(ctx.workspace_id, ctx.product_id, ctx.version);

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .map(|chunk| ChunkRecord {
                id: Ulid::new().to_string(),
                product_id: ctx.product_id,
                version: ctx.version,
                chunk_id: chunk.chunk_id.clone(),
                source_file: chunk.source_file.clone(),
                page_number: chunk.page_number,
                section: chunk.section.clone(),
                field_name: chunk.field_name.clone(),
                score: None,
                created_at: Utc::now(),
            })
            .collect();
        ctx.catalog.upsert_chunk_records(&records).await?;

        let token_total: u64 = chunks.iter().map(|c| u64::from(c.token_count)).sum();
        let chunk_count = chunks.len();
        board.chunks = chunks;

        Ok(StageOutcome::succeeded()
            .with_metric("files_total_count", batch.len() as f64)
            .with_metric("files_integrity_failed_count", integrity_failures as f64)
            .with_metric("files_read_failed_count", read_failures as f64)
            .with_metric("chunk_count", chunk_count as f64)
            .with_metric("token_total_count", token_total as f64)
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Jsonl,
                name: "chunks.jsonl".to_string(),
                display_name: Some("Normalized chunks".to_string()),
                blob: location,
                bytes: jsonl.into(),
            }))
    }
}

/// Head-checks a raw file's blob against its registered ETag.
async fn verify_file(ctx: &StageContext, file: &RawFile) -> Result<(), PipelineError> {
    let head = ctx.blob.head(&file.blob).await?;
    if let Some(expected) = &file.etag {
        if &head.etag != expected {
            return Err(PipelineError::IntegrityMismatch {
                file: file.file_stem.clone(),
                expected: expected.clone(),
                actual: head.etag,
            });
        }
    }
    Ok(())
}

/// Applies the playbook and cuts one document into chunks.
fn chunk_document(
    ctx: &StageContext,
    playbook: &Playbook,
    chunking: &ChunkingConfig,
    file: &RawFile,
    raw_text: &str,
) -> Vec<Chunk> {
    let mut text = raw_text.to_string();
    if playbook.strip_markup && looks_like_markup(&file.content_type) {
        text = text::strip_markup(&text);
    }
    if playbook.normalize_whitespace {
        text = text::normalize_whitespace(&text);
    }
    if !playbook.drop_line_patterns.is_empty() {
        text = text
            .lines()
            .filter(|line| {
                !playbook
                    .drop_line_patterns
                    .iter()
                    .any(|p| line.contains(p.as_str()))
            })
            .collect::<Vec<_>>()
            .join("\n");
    }

    let field_name = (file.content_type == "application/json").then(|| "document".to_string());
    let mut chunks = Vec::new();
    let mut ordinal: u32 = 0;

    let pages = text::split_pages(&text);
    let multi_page = pages.len() > 1;
    for (page_index, page) in pages.iter().enumerate() {
        let page_number = multi_page.then_some(page_index as u32 + 1);
        let sections = if playbook.fence_sections {
            text::fence_sections(page)
        } else {
            vec![text::Section {
                heading: None,
                body: page.lines().collect(),
            }]
        };
        for section in sections {
            let section_name = section.heading.or_else(|| playbook.audience.clone());
            let body = section.body.join("\n");
            let pieces = if playbook.split_sentences {
                text::split_sentences(&body)
            } else {
                body.split("\n\n").map(|p| p.to_string()).collect()
            };
            for chunk_text in assemble(&pieces, chunking) {
                chunks.push(Chunk {
                    chunk_id: ChunkId::derive(
                        ctx.product_id,
                        ctx.version,
                        &file.file_stem,
                        ordinal,
                    ),
                    source_file: file.file_stem.clone(),
                    ordinal,
                    token_count: text::token_count(&chunk_text),
                    text: chunk_text,
                    page_number,
                    section: section_name.clone(),
                    field_name: field_name.clone(),
                });
                ordinal += 1;
            }
        }
    }
    chunks
}

fn looks_like_markup(content_type: &str) -> bool {
    content_type.contains("html") || content_type.contains("xml")
}

/// Packs sentence pieces into chunks around the target token size, carrying
/// the configured overlap between neighbours and merging under-length
/// leftovers forward.
fn assemble(pieces: &[String], chunking: &ChunkingConfig) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_tokens: u32 = 0;

    for piece in pieces {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let tokens = text::token_count(piece);
        if current_tokens + tokens > chunking.target_tokens && !current.is_empty() {
            chunks.push(current.join(" "));
            // Carry trailing pieces forward as overlap.
            let mut overlap: Vec<&str> = Vec::new();
            let mut overlap_tokens = 0;
            for kept in current.iter().rev() {
                let kept_tokens = text::token_count(kept);
                if overlap_tokens + kept_tokens > chunking.overlap_tokens {
                    break;
                }
                overlap_tokens += kept_tokens;
                overlap.insert(0, kept);
            }
            current = overlap;
            current_tokens = overlap_tokens;
        }
        current.push(piece);
        current_tokens += tokens;
    }
    if !current.is_empty() {
        let tail = current.join(" ");
        if (tail.len() as u32) < chunking.min_chunk_chars && !chunks.is_empty() {
            let last = chunks.len() - 1;
            chunks[last] = format!("{} {}", chunks[last], tail);
        } else {
            chunks.push(tail);
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunking(target: u32, overlap: u32) -> ChunkingConfig {
        ChunkingConfig {
            target_tokens: target,
            overlap_tokens: overlap,
            min_chunk_chars: 10,
        }
    }

    #[test]
    fn test_assemble_respects_target_size() {
        let pieces: Vec<String> = (0..20)
            .map(|i| format!("sentence number {} with several words here.", i))
            .collect();
        let chunks = assemble(&pieces, &chunking(20, 0));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(text::token_count(chunk) <= 27, "chunk too large: {}", chunk);
        }
    }

    #[test]
    fn test_assemble_carries_overlap() {
        let pieces: Vec<String> = (0..6)
            .map(|i| format!("alpha beta gamma delta {}.", i))
            .collect();
        let chunks = assemble(&pieces, &chunking(10, 5));
        assert!(chunks.len() >= 2);
        // The first sentence of a later chunk repeats the tail of the
        // previous one.
        assert!(chunks[1].contains(chunks[0].rsplit('.').nth(1).unwrap_or("").trim()));
    }

    #[test]
    fn test_assemble_merges_short_tail() {
        let pieces = vec![
            "a long enough opening sentence with many words in it.".to_string(),
            "tiny.".to_string(),
        ];
        let chunks = assemble(&pieces, &chunking(10, 0));
        assert_eq!(chunks.len(), 1, "short tail should merge: {:?}", chunks);
    }

    #[test]
    fn test_empty_pieces_produce_no_chunks() {
        let chunks = assemble(&[], &chunking(10, 0));
        assert!(chunks.is_empty());
    }
}
