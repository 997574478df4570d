// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure layer: concrete implementations of the domain seams
//! (SQLite catalog, S3 blob store, connectors, embedding and vector store
//! clients), plus configuration, metrics, and the stage implementations.

pub mod blob;
pub mod catalog;
pub mod config;
pub mod connectors;
pub mod embedding;
pub mod metrics;
pub mod stages;
pub mod vector;
