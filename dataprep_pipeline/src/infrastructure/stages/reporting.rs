// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Reporting Stage
//!
//! Renders the human-readable run summaries: a CSV of per-source-file chunk
//! statistics and violations, and a one-page PDF cover sheet. The PDF is
//! written directly (objects and xref table by hand) - it carries a dozen
//! summary lines, not typeset prose, and that keeps a document engine out
//! of the build.

use async_trait::async_trait;
use std::collections::BTreeMap;

use dataprep_pipeline_domain::entities::{ArtifactDraft, ArtifactType, StageName};
use dataprep_pipeline_domain::services::{RunBlackboard, Stage, StageContext, StageOutcome};
use dataprep_pipeline_domain::value_objects::BlobLocation;
use dataprep_pipeline_domain::PipelineError;

/// Stage implementation for `reporting`.
pub struct ReportingStage;

#[async_trait]
impl Stage for ReportingStage {
    fn name(&self) -> StageName {
        StageName::Reporting
    }

    async fn execute(
        &self,
        ctx: &StageContext,
        board: &mut RunBlackboard,
    ) -> Result<StageOutcome, PipelineError> {
        let csv_bytes = render_csv(board)?;
        let pdf_bytes = render_pdf(ctx, board);

        Ok(StageOutcome::succeeded()
            .with_metric("report_count", 2.0)
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Csv,
                name: "report.csv".to_string(),
                display_name: Some("Score report (CSV)".to_string()),
                blob: BlobLocation::report(
                    ctx.workspace_id,
                    ctx.product_id,
                    ctx.version,
                    "report.csv",
                ),
                bytes: csv_bytes.into(),
            })
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Pdf,
                name: "report.pdf".to_string(),
                display_name: Some("Run summary (PDF)".to_string()),
                blob: BlobLocation::report(
                    ctx.workspace_id,
                    ctx.product_id,
                    ctx.version,
                    "report.pdf",
                ),
                bytes: pdf_bytes.into(),
            }))
    }
}

/// Per-source-file score summary plus a violations section.
fn render_csv(board: &RunBlackboard) -> Result<Vec<u8>, PipelineError> {
    #[derive(Default)]
    struct FileStats {
        chunks: u64,
        tokens: u64,
        quality_sum: f64,
    }

    let mut per_file: BTreeMap<&str, FileStats> = BTreeMap::new();
    for scored in &board.scored {
        let entry = per_file.entry(scored.source_file.as_str()).or_default();
        entry.chunks += 1;
        entry.tokens += u64::from(scored.token_count);
        entry.quality_sum += scored.scores.quality;
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["source_file", "chunk_count", "token_count", "mean_quality"])
        .map_err(csv_err)?;
    for (stem, stats) in &per_file {
        writer
            .write_record([
                stem.to_string(),
                stats.chunks.to_string(),
                stats.tokens.to_string(),
                format!("{:.4}", stats.quality_sum / stats.chunks.max(1) as f64),
            ])
            .map_err(csv_err)?;
    }

    writer.write_record(["", "", "", ""]).map_err(csv_err)?;
    writer
        .write_record(["violation_rule", "severity", "affected", "rate"])
        .map_err(csv_err)?;
    for violation in &board.violations {
        writer
            .write_record([
                violation.rule_name.clone(),
                violation.severity.as_str().to_string(),
                violation.affected_count.to_string(),
                format!("{:.4}", violation.violation_rate),
            ])
            .map_err(csv_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::InternalError(format!("csv writer: {}", e)))
}

fn csv_err(e: csv::Error) -> PipelineError {
    PipelineError::InternalError(format!("csv: {}", e))
}

/// Collects the headline lines and writes them as a one-page PDF.
fn render_pdf(ctx: &StageContext, board: &RunBlackboard) -> Vec<u8> {
    let mut lines = vec![
        "Data readiness report".to_string(),
        format!("Product: {}", ctx.product_id),
        format!("Version: {}", ctx.version),
        format!("Run: {}", ctx.run_id),
    ];
    if let Some(fp) = &board.fingerprint {
        lines.push(format!("AI trust score: {:.3}", fp.ai_trust_score));
        lines.push(format!("Chunks: {}", fp.chunk_count));
        lines.push(format!("Source files: {}", fp.source_file_count));
    }
    if let Some(verdict) = board.verdict {
        lines.push(format!("Policy verdict: {}", verdict.as_str()));
        lines.push(format!("Violations: {}", board.violations.len()));
    }
    write_pdf(&lines)
}

/// Minimal single-page PDF: five objects, Helvetica, one text block.
fn write_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT /F1 12 Tf 50 760 Td 16 TL\n");
    for line in lines {
        let escaped = line.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");
        content.push_str(&format!("({}) Tj T*\n", escaped));
    }
    content.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in &offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));
    pdf.into_bytes()
}
