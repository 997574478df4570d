// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Quality Rules and Violations
//!
//! The versioned rule set a product's policy stage evaluates, and the
//! violations it records. Seven rule families cover the checks the policy
//! stage knows how to run; each family carries the common rule envelope
//! plus its own thresholds.
//!
//! ## Verdict vs run status
//!
//! The policy verdict (`passed` / `warnings` / `failed`) is *data*: it is
//! recorded on the run's metrics and surfaced by the insight APIs. The run
//! itself fails only when a violated rule is enabled, has severity ERROR,
//! and is explicitly marked `fatal`. A failing verdict with no fatal rule
//! leaves the run on its normal path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::value_objects::{ProductId, RunId};
use crate::PipelineError;

/// Severity attached to a rule and inherited by its violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        match s {
            "ERROR" => Ok(Severity::Error),
            "WARNING" => Ok(Severity::Warning),
            "INFO" => Ok(Severity::Info),
            other => Err(PipelineError::InvalidInput(format!(
                "unknown severity '{}'",
                other
            ))),
        }
    }
}

/// The rule families the policy stage evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    RequiredFields,
    DuplicateRate,
    ChunkCoverage,
    BadExtensions,
    Freshness,
    FileSize,
    ContentLength,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::RequiredFields => "required_fields",
            RuleKind::DuplicateRate => "duplicate_rate",
            RuleKind::ChunkCoverage => "chunk_coverage",
            RuleKind::BadExtensions => "bad_extensions",
            RuleKind::Freshness => "freshness",
            RuleKind::FileSize => "file_size",
            RuleKind::ContentLength => "content_length",
        }
    }
}

/// Common envelope shared by every rule family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Only an enabled ERROR rule with `fatal = true` can fail the run.
    #[serde(default)]
    pub fatal: bool,
}

fn default_enabled() -> bool {
    true
}

impl QualityRule {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "rule name must not be empty".into(),
            ));
        }
        if self.fatal && self.severity != Severity::Error {
            return Err(PipelineError::InvalidInput(format!(
                "rule '{}' is fatal but severity is {}; only ERROR rules may be fatal",
                self.name,
                self.severity.as_str()
            )));
        }
        Ok(())
    }
}

/// Chunks must expose the named metadata fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredFieldsRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    pub required_fields: Vec<String>,
}

/// Share of duplicate chunk texts must stay under the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateRateRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    /// 0-1 ratio.
    pub max_duplicate_rate: f64,
}

/// Every processed file must yield at least this many chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkCoverageRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    pub min_chunks_per_file: u32,
}

/// Source files with these extensions should not have been ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadExtensionsRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    pub banned_extensions: Vec<String>,
}

/// Raw files must have been ingested within the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    pub max_age_days: u32,
}

/// Raw file sizes must fall within the band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSizeRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    #[serde(default)]
    pub min_size_bytes: u64,
    pub max_size_bytes: u64,
}

/// Chunk text lengths must fall within the band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentLengthRule {
    #[serde(flatten)]
    pub rule: QualityRule,
    #[serde(default)]
    pub min_chars: u32,
    pub max_chars: u32,
}

/// The versioned rule set evaluated by a product's policy stage.
///
/// Replacing rules creates a new version; runs resolve the latest effective
/// set at trigger time and snapshot it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityRuleSet {
    pub product_id: ProductId,
    pub version: u32,
    #[serde(default)]
    pub required_fields_rules: Vec<RequiredFieldsRule>,
    #[serde(default)]
    pub duplicate_rate_rules: Vec<DuplicateRateRule>,
    #[serde(default)]
    pub chunk_coverage_rules: Vec<ChunkCoverageRule>,
    #[serde(default)]
    pub bad_extensions_rules: Vec<BadExtensionsRule>,
    #[serde(default)]
    pub freshness_rules: Vec<FreshnessRule>,
    #[serde(default)]
    pub file_size_rules: Vec<FileSizeRule>,
    #[serde(default)]
    pub content_length_rules: Vec<ContentLengthRule>,
}

impl QualityRuleSet {
    /// An empty rule set at version 0, the state before any rules are saved.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            version: 0,
            required_fields_rules: Vec::new(),
            duplicate_rate_rules: Vec::new(),
            chunk_coverage_rules: Vec::new(),
            bad_extensions_rules: Vec::new(),
            freshness_rules: Vec::new(),
            file_size_rules: Vec::new(),
            content_length_rules: Vec::new(),
        }
    }

    /// The default rules attached to a freshly created product.
    pub fn baseline(product_id: ProductId) -> Self {
        let mut set = Self::empty(product_id);
        set.version = 1;
        set.duplicate_rate_rules.push(DuplicateRateRule {
            rule: QualityRule {
                name: "duplicate-chunks".into(),
                description: "Duplicate chunk text share must stay low".into(),
                severity: Severity::Warning,
                enabled: true,
                fatal: false,
            },
            max_duplicate_rate: 0.10,
        });
        set.chunk_coverage_rules.push(ChunkCoverageRule {
            rule: QualityRule {
                name: "chunk-coverage".into(),
                description: "Every processed file must produce chunks".into(),
                severity: Severity::Error,
                enabled: true,
                fatal: false,
            },
            min_chunks_per_file: 1,
        });
        set.content_length_rules.push(ContentLengthRule {
            rule: QualityRule {
                name: "content-length".into(),
                description: "Chunks must carry a usable amount of text".into(),
                severity: Severity::Info,
                enabled: true,
                fatal: false,
            },
            min_chars: 20,
            max_chars: 8000,
        });
        set
    }

    /// Validates every rule in the set.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for r in &self.required_fields_rules {
            r.rule.validate()?;
            if r.required_fields.is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "rule '{}' lists no required fields",
                    r.rule.name
                )));
            }
        }
        for r in &self.duplicate_rate_rules {
            r.rule.validate()?;
            if !(0.0..=1.0).contains(&r.max_duplicate_rate) {
                return Err(PipelineError::InvalidInput(format!(
                    "rule '{}' max_duplicate_rate must be within 0-1",
                    r.rule.name
                )));
            }
        }
        for r in &self.chunk_coverage_rules {
            r.rule.validate()?;
        }
        for r in &self.bad_extensions_rules {
            r.rule.validate()?;
        }
        for r in &self.freshness_rules {
            r.rule.validate()?;
        }
        for r in &self.file_size_rules {
            r.rule.validate()?;
            if r.max_size_bytes > 0 && r.min_size_bytes > r.max_size_bytes {
                return Err(PipelineError::InvalidInput(format!(
                    "rule '{}' min_size_bytes exceeds max_size_bytes",
                    r.rule.name
                )));
            }
        }
        for r in &self.content_length_rules {
            r.rule.validate()?;
            if r.max_chars > 0 && r.min_chars > r.max_chars {
                return Err(PipelineError::InvalidInput(format!(
                    "rule '{}' min_chars exceeds max_chars",
                    r.rule.name
                )));
            }
        }
        Ok(())
    }

    /// Total number of rules across all families.
    pub fn rule_count(&self) -> usize {
        self.required_fields_rules.len()
            + self.duplicate_rate_rules.len()
            + self.chunk_coverage_rules.len()
            + self.bad_extensions_rules.len()
            + self.freshness_rules.len()
            + self.file_size_rules.len()
            + self.content_length_rules.len()
    }
}

/// One recorded rule violation for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityViolation {
    pub id: String,
    pub run_id: RunId,
    pub rule_name: String,
    pub rule_type: RuleKind,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
    pub affected_count: u64,
    pub total_count: u64,
    /// `affected_count / total_count`, 0-1.
    pub violation_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl QualityViolation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: RunId,
        rule_name: impl Into<String>,
        rule_type: RuleKind,
        severity: Severity,
        message: impl Into<String>,
        details: serde_json::Value,
        affected_count: u64,
        total_count: u64,
    ) -> Self {
        let violation_rate = if total_count == 0 {
            0.0
        } else {
            affected_count as f64 / total_count as f64
        };
        Self {
            id: Ulid::new().to_string(),
            run_id,
            rule_name: rule_name.into(),
            rule_type,
            severity,
            message: message.into(),
            details,
            affected_count,
            total_count,
            violation_rate,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of evaluating the effective rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyVerdict {
    Passed,
    Warnings,
    Failed,
}

impl PolicyVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyVerdict::Passed => "passed",
            PolicyVerdict::Warnings => "warnings",
            PolicyVerdict::Failed => "failed",
        }
    }

    /// Derives the verdict from a run's violations.
    pub fn from_violations(violations: &[QualityViolation]) -> Self {
        if violations
            .iter()
            .any(|v| v.severity == Severity::Error)
        {
            PolicyVerdict::Failed
        } else if violations
            .iter()
            .any(|v| v.severity == Severity::Warning)
        {
            PolicyVerdict::Warnings
        } else {
            PolicyVerdict::Passed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_baseline_rules_validate() {
        let set = QualityRuleSet::baseline(ProductId::new());
        set.validate().unwrap();
        assert_eq!(set.rule_count(), 3);
    }

    #[test]
    fn test_fatal_requires_error_severity() {
        let rule = QualityRule {
            name: "strict".into(),
            description: String::new(),
            severity: Severity::Warning,
            enabled: true,
            fatal: true,
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_duplicate_rate_bounds_checked() {
        let mut set = QualityRuleSet::empty(ProductId::new());
        set.duplicate_rate_rules.push(DuplicateRateRule {
            rule: QualityRule {
                name: "dups".into(),
                description: String::new(),
                severity: Severity::Warning,
                enabled: true,
                fatal: false,
            },
            max_duplicate_rate: 1.5,
        });
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_verdict_from_violations() {
        let run_id = RunId::new();
        let warning = QualityViolation::new(
            run_id,
            "dups",
            RuleKind::DuplicateRate,
            Severity::Warning,
            "12% duplicates",
            json!({}),
            12,
            100,
        );
        let error = QualityViolation::new(
            run_id,
            "coverage",
            RuleKind::ChunkCoverage,
            Severity::Error,
            "file produced no chunks",
            json!({}),
            1,
            4,
        );
        assert_eq!(PolicyVerdict::from_violations(&[]), PolicyVerdict::Passed);
        assert_eq!(
            PolicyVerdict::from_violations(&[warning.clone()]),
            PolicyVerdict::Warnings
        );
        assert_eq!(
            PolicyVerdict::from_violations(&[warning, error]),
            PolicyVerdict::Failed
        );
    }

    #[test]
    fn test_violation_rate_derived() {
        let v = QualityViolation::new(
            RunId::new(),
            "size",
            RuleKind::FileSize,
            Severity::Info,
            "oversized",
            json!({}),
            1,
            4,
        );
        assert!((v.violation_rate - 0.25).abs() < 1e-9);
    }
}
