// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Typed Entity Identifiers
//!
//! One distinct ID type per catalog entity, built on
//! [`GenericId`](super::generic_id::GenericId). A `RunId` can never be passed
//! where a `ProductId` is expected; the compiler enforces the entity
//! ownership graph at every call site.

use super::generic_id::{GenericId, IdCategory};

macro_rules! entity_id {
    ($(#[$doc:meta])* $marker:ident, $alias:ident, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $marker;

        impl IdCategory for $marker {
            fn category_name() -> &'static str {
                $name
            }
        }

        $(#[$doc])*
        pub type $alias = GenericId<$marker>;
    };
}

entity_id!(
    /// Identifier of a tenant workspace, the boundary every other entity
    /// belongs to.
    WorkspaceMarker,
    WorkspaceId,
    "workspace"
);

entity_id!(
    /// Identifier of a product: a tenant-owned collection of data sources and
    /// the processed artifacts derived from them.
    ProductMarker,
    ProductId,
    "product"
);

entity_id!(
    /// Identifier of a data source attached to a product.
    DataSourceMarker,
    DataSourceId,
    "data_source"
);

entity_id!(
    /// Identifier of one ingested raw file.
    RawFileMarker,
    RawFileId,
    "raw_file"
);

entity_id!(
    /// Identifier of a pipeline run.
    RunMarker,
    RunId,
    "run"
);

entity_id!(
    /// Identifier of an artifact produced by a stage.
    ArtifactMarker,
    ArtifactId,
    "artifact"
);
