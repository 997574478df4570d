// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tracing Installation
//!
//! Installs the global tracing subscriber once, early in `main`, honoring
//! the configured level and output format. Everything after this point logs
//! through `tracing` macros with structured fields; nothing else in the
//! workspace touches subscriber setup.
//!
//! The level string accepts either a bare level (`info`) or a full
//! `EnvFilter` directive set (`info,sqlx=warn`); the `RUST_LOG` environment
//! variable, when present, wins over the configured value.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Result<Self, LoggerError> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggerError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format '{0}', expected 'text' or 'json'")]
    UnknownFormat(String),

    #[error("invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("tracing subscriber already installed")]
    AlreadyInstalled,
}

/// Installs the global subscriber. Call exactly once.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<(), LoggerError> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) => EnvFilter::try_new(env),
        Err(_) => EnvFilter::try_new(level),
    }
    .map_err(|_| LoggerError::InvalidFilter(level.to_string()))?;

    let result = match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
    };
    result.map_err(|_| LoggerError::AlreadyInstalled)
}
