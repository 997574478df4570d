// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Quota Capability
//!
//! Billing-collaborator seam checked at the two mutation entry points:
//! ingest and pipeline trigger. A denial surfaces as `QuotaExceeded`
//! without mutating any state.

use async_trait::async_trait;

use crate::value_objects::WorkspaceId;
use crate::PipelineError;

#[async_trait]
pub trait Quota: Send + Sync {
    /// Checked before any ingest work begins.
    async fn check_ingest(&self, workspace: WorkspaceId) -> Result<(), PipelineError>;

    /// Checked before a pipeline run is queued.
    async fn check_run(&self, workspace: WorkspaceId) -> Result<(), PipelineError>;
}

/// Quota implementation that admits everything; the default when no billing
/// collaborator is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedQuota;

#[async_trait]
impl Quota for UnlimitedQuota {
    async fn check_ingest(&self, _workspace: WorkspaceId) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn check_run(&self, _workspace: WorkspaceId) -> Result<(), PipelineError> {
        Ok(())
    }
}
