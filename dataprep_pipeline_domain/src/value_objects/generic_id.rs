// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic ID Value Object
//!
//! A generic, type-safe ID value object built on ULID (Universally Unique
//! Lexicographically Sortable Identifier) with phantom types. Each entity in
//! the catalog gets its own distinct ID type that cannot be confused with any
//! other at compile time.
//!
//! ## Overview
//!
//! - **Type Safety**: phantom types prevent ID category mixing
//! - **ULID-Based**: sortable by creation time, unique, 26-char canonical form
//! - **Zero-Cost**: the marker carries no runtime state
//! - **Serialization**: plain ULID string in JSON and in catalog columns
//!
//! Specific ID types (`ProductId`, `RunId`, ...) are declared in
//! [`super::identifiers`] by implementing [`IdCategory`] on a marker type.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use ulid::Ulid;

use crate::PipelineError;

/// ID category trait for type-specific behavior.
///
/// Implemented by zero-sized marker types; the category name feeds validation
/// messages and debugging output.
pub trait IdCategory {
    /// Gets the category name for this ID type
    fn category_name() -> &'static str;

    /// Validates category-specific constraints
    fn validate_id(ulid: &Ulid) -> Result<(), PipelineError> {
        if *ulid == Ulid::nil() {
            return Err(PipelineError::InvalidInput(format!(
                "{} ID cannot be nil",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// Generic identifier value object for domain entities.
///
/// The base implementation that specific entity IDs build upon. Not used
/// directly - use the concrete ID types like `ProductId` or `RunId`.
///
/// # Representation
///
/// - **Rust**: `GenericId<T>` with phantom type parameter
/// - **JSON**: string of the canonical 26-character ULID form
/// - **SQLite**: TEXT column with the same string
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _phantom: std::marker::PhantomData<T>,
}

// Serialize as the plain ULID string rather than a JSON object.
impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ulid = Ulid::from_string(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }
}

impl<T: IdCategory> GenericId<T> {
    /// Creates a new time-ordered entity ID.
    ///
    /// ULIDs sort lexicographically by creation time, which keeps catalog
    /// indexes append-mostly and makes chronological queries cheap.
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Creates an entity ID from an existing ULID with validation.
    pub fn from_ulid(ulid: Ulid) -> Result<Self, PipelineError> {
        T::validate_id(&ulid)?;
        Ok(Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Parses an entity ID from its canonical string form.
    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        let ulid = Ulid::from_string(s).map_err(|e| {
            PipelineError::InvalidInput(format!(
                "invalid {} ID '{}': {}",
                T::category_name(),
                s,
                e
            ))
        })?;
        Self::from_ulid(ulid)
    }

    /// Returns the underlying ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    /// Returns the embedded creation timestamp in milliseconds.
    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TestMarker;

    impl IdCategory for TestMarker {
        fn category_name() -> &'static str {
            "test"
        }
    }

    type TestId = GenericId<TestMarker>;

    #[test]
    fn test_id_creation_is_unique() {
        let a = TestId::new();
        let b = TestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_round_trips_through_string() {
        let id = TestId::new();
        let parsed = TestId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_nil_id_rejected() {
        assert!(TestId::from_ulid(Ulid::nil()).is_err());
    }

    #[test]
    fn test_invalid_string_rejected() {
        assert!(TestId::from_string("not-a-ulid").is_err());
    }

    #[test]
    fn test_serialization_is_plain_string() {
        let id = TestId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
