// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Preprocessing Playbook
//!
//! A declarative recipe the preprocess stage applies to raw documents:
//! normalization, section fencing, sentence splitting, and boilerplate
//! removal. Playbooks are authored by an external collaborator; the
//! pipeline treats them as data and snapshots the resolved playbook into
//! the run config.

use serde::{Deserialize, Serialize};

/// Declarative preprocessing recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    /// Strip markup tags before chunking.
    #[serde(default = "default_true")]
    pub strip_markup: bool,
    /// Collapse runs of whitespace and normalize line endings.
    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,
    /// Treat markdown-style headings as section fences.
    #[serde(default = "default_true")]
    pub fence_sections: bool,
    /// Prefer sentence boundaries when cutting chunks.
    #[serde(default = "default_true")]
    pub split_sentences: bool,
    /// Lines matching any of these literal snippets are dropped.
    #[serde(default)]
    pub drop_line_patterns: Vec<String>,
    /// Intended audience tag propagated into chunk sections, if set.
    #[serde(default)]
    pub audience: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Playbook {
    fn default() -> Self {
        Self {
            name: "standard".to_string(),
            strip_markup: true,
            normalize_whitespace: true,
            fence_sections: true,
            split_sentences: true,
            drop_line_patterns: Vec::new(),
            audience: None,
        }
    }
}
