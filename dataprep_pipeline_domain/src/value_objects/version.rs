// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Version Value Object
//!
//! A product version is a positive integer attached to a cohesive batch of
//! raw files; pipeline runs operate on exactly one version. `Version`
//! enforces the ≥ 1 constraint at construction so that a zero version
//! (the "empty product" sentinel on `Product::current_version`) can never
//! reach a raw file or a run.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::PipelineError;

/// Validated version number for raw-file batches and pipeline runs.
///
/// `Product::current_version` is a plain `u32` (0 means "nothing ingested
/// yet"); everywhere else a version is a `Version` and therefore ≥ 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    /// Creates a version, rejecting zero.
    pub fn new(value: u32) -> Result<Self, PipelineError> {
        if value == 0 {
            return Err(PipelineError::InvalidInput(
                "version must be a positive integer".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The first version of any product.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw integer value.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for Version {
    type Error = PipelineError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_version_rejected() {
        assert!(Version::new(0).is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v1 = Version::first();
        let v2 = v1.next();
        assert!(v1 < v2);
        assert_eq!(v2.get(), 2);
    }

    #[test]
    fn test_version_serializes_as_integer() {
        let v = Version::new(4).unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "4");
    }
}
