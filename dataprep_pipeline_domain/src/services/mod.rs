// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain services: the stage contract and the narrow seams to external
//! collaborators (embedding providers, billing, playbook authors).

pub mod embedder;
pub mod playbook;
pub mod quota;
pub mod stage;

pub use embedder::Embedder;
pub use playbook::Playbook;
pub use quota::{Quota, UnlimitedQuota};
pub use stage::{
    CancelFlag, IndexingReport, PipelineTuning, RunBlackboard, Stage, StageContext, StageOutcome,
};
