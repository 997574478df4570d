// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Stage
//!
//! Evaluates the effective quality rule set against the run's chunks and
//! raw files, persists the violations, and derives the policy verdict.
//!
//! The verdict is a business outcome recorded in metrics and the policy
//! report; it never fails the stage by itself. The stage (and with it the
//! run) fails only when a violated rule is enabled, severity ERROR, and
//! explicitly marked fatal.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use dataprep_pipeline_domain::entities::{
    ArtifactDraft, ArtifactType, PolicyVerdict, QualityRuleSet, QualityViolation, RawFile,
    RuleKind, StageName,
};
use dataprep_pipeline_domain::services::{RunBlackboard, Stage, StageContext, StageOutcome};
use dataprep_pipeline_domain::value_objects::{BlobLocation, Chunk};
use dataprep_pipeline_domain::repositories::Catalog;
use dataprep_pipeline_domain::PipelineError;

/// Stage implementation for `policy`.
pub struct PolicyStage;

#[async_trait]
impl Stage for PolicyStage {
    fn name(&self) -> StageName {
        StageName::Policy
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

        let evaluation = evaluate(ctx, &ctx.rule_set, &board.chunks, &files);
        ctx.catalog.insert_violations(&evaluation.violations).await?;

        let verdict = PolicyVerdict::from_violations(&evaluation.violations);
        let report = json!({
            "verdict": verdict.as_str(),
            "rule_set_version": ctx.rule_set.version,
            "rules_evaluated_count": evaluation.rules_evaluated,
            "violations": evaluation.violations,
        });
        let location =
            BlobLocation::report(ctx.workspace_id, ctx.product_id, ctx.version, "policy.json");

        let mut outcome = if evaluation.fatal_rule_violated {
            StageOutcome::failed("fatal quality rule violated")
        } else {
            StageOutcome::succeeded()
        };
        outcome = outcome
            .with_metric("rules_evaluated_count", evaluation.rules_evaluated as f64)
            .with_metric("violation_count", evaluation.violations.len() as f64)
            .with_metric(
                "error_violation_count",
                evaluation
                    .violations
                    .iter()
                    .filter(|v| v.severity == dataprep_pipeline_domain::entities::Severity::Error)
                    .count() as f64,
            )
            .with_metric(
                "policy_failed",
                if verdict == PolicyVerdict::Failed { 1.0 } else { 0.0 },
            )
            .with_artifact(ArtifactDraft {
                artifact_type: ArtifactType::Json,
                name: "policy.json".to_string(),
                display_name: Some("Policy report".to_string()),
                blob: location,
                bytes: serde_json::to_vec_pretty(&report)?.into(),
            });

        board.violations = evaluation.violations;
        board.verdict = Some(verdict);
        Ok(outcome)
    }
}

struct Evaluation {
    violations: Vec<QualityViolation>,
    rules_evaluated: usize,
    fatal_rule_violated: bool,
}

fn evaluate(
    ctx: &StageContext,
    rules: &QualityRuleSet,
    chunks: &[Chunk],
    files: &[RawFile],
) -> Evaluation {
    let mut violations = Vec::new();
    let mut rules_evaluated = 0;
    let mut fatal = false;
    let total_chunks = chunks.len() as u64;
    let total_files = files.len() as u64;

    for rule in rules.required_fields_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let missing = chunks
            .iter()
            .filter(|c| {
                rule.required_fields.iter().any(|field| match field.as_str() {
                    "section" => c.section.is_none(),
                    "page_number" => c.page_number.is_none(),
                    "field_name" => c.field_name.is_none(),
                    _ => true,
                })
            })
            .count() as u64;
        if missing > 0 {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::RequiredFields,
                rule.rule.severity,
                format!("{} of {} chunks missing required fields", missing, total_chunks),
                json!({ "required_fields": rule.required_fields }),
                missing,
                total_chunks,
            ));
        }
    }

    for rule in rules.duplicate_rate_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let mut seen: HashMap<&str, u64> = HashMap::new();
        for chunk in chunks {
            *seen.entry(chunk.text.as_str()).or_default() += 1;
        }
        let duplicates: u64 = seen.values().map(|n| n - 1).sum();
        let rate = if total_chunks == 0 {
            0.0
        } else {
            duplicates as f64 / total_chunks as f64
        };
        if rate > rule.max_duplicate_rate {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::DuplicateRate,
                rule.rule.severity,
                format!(
                    "duplicate chunk rate {:.3} exceeds {:.3}",
                    rate, rule.max_duplicate_rate
                ),
                json!({ "max_duplicate_rate": rule.max_duplicate_rate }),
                duplicates,
                total_chunks,
            ));
        }
    }

    for rule in rules.chunk_coverage_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let mut per_file: BTreeMap<&str, u64> = BTreeMap::new();
        for file in files {
            per_file.insert(file.file_stem.as_str(), 0);
        }
        for chunk in chunks {
            if let Some(count) = per_file.get_mut(chunk.source_file.as_str()) {
                *count += 1;
            }
        }
        let uncovered: Vec<&str> = per_file
            .iter()
            .filter(|(_, n)| **n < u64::from(rule.min_chunks_per_file))
            .map(|(stem, _)| *stem)
            .collect();
        if !uncovered.is_empty() {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::ChunkCoverage,
                rule.rule.severity,
                format!(
                    "{} of {} files below {} chunks",
                    uncovered.len(),
                    total_files,
                    rule.min_chunks_per_file
                ),
                json!({ "files": uncovered }),
                uncovered.len() as u64,
                total_files,
            ));
        }
    }

    for rule in rules.bad_extensions_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let banned: BTreeSet<String> = rule
            .banned_extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        let offenders: Vec<&str> = files
            .iter()
            .filter(|f| {
                f.filename
                    .rsplit('.')
                    .next()
                    .map(|ext| banned.contains(&ext.to_ascii_lowercase()))
                    .unwrap_or(false)
            })
            .map(|f| f.file_stem.as_str())
            .collect();
        if !offenders.is_empty() {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::BadExtensions,
                rule.rule.severity,
                format!("{} files carry banned extensions", offenders.len()),
                json!({ "files": offenders }),
                offenders.len() as u64,
                total_files,
            ));
        }
    }

    for rule in rules.freshness_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(rule.max_age_days));
        let stale = files.iter().filter(|f| f.ingested_at < cutoff).count() as u64;
        if stale > 0 {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::Freshness,
                rule.rule.severity,
                format!("{} files older than {} days", stale, rule.max_age_days),
                json!({ "max_age_days": rule.max_age_days }),
                stale,
                total_files,
            ));
        }
    }

    for rule in rules.file_size_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let offenders = files
            .iter()
            .filter(|f| {
                f.size_bytes < rule.min_size_bytes
                    || (rule.max_size_bytes > 0 && f.size_bytes > rule.max_size_bytes)
            })
            .count() as u64;
        if offenders > 0 {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::FileSize,
                rule.rule.severity,
                format!("{} files outside the size band", offenders),
                json!({
                    "min_size_bytes": rule.min_size_bytes,
                    "max_size_bytes": rule.max_size_bytes,
                }),
                offenders,
                total_files,
            ));
        }
    }

    for rule in rules.content_length_rules.iter().filter(|r| r.rule.enabled) {
        rules_evaluated += 1;
        let offenders = chunks
            .iter()
            .filter(|c| {
                let len = c.text.chars().count() as u32;
                len < rule.min_chars || (rule.max_chars > 0 && len > rule.max_chars)
            })
            .count() as u64;
        if offenders > 0 {
            fatal |= rule.rule.fatal;
            violations.push(QualityViolation::new(
                ctx.run_id,
                &rule.rule.name,
                RuleKind::ContentLength,
                rule.rule.severity,
                format!("{} chunks outside the length band", offenders),
                json!({ "min_chars": rule.min_chars, "max_chars": rule.max_chars }),
                offenders,
                total_chunks,
            ));
        }
    }

    Evaluation {
        violations,
        rules_evaluated,
        fatal_rule_violated: fatal,
    }
}
