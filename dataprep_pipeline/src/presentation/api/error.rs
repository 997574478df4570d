// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # API Error Envelope
//!
//! Maps [`PipelineError`] to HTTP responses with the canonical envelope
//! `{"detail", "code", "context"}`. The mapping follows the error
//! taxonomy; two lookups carry their own status by contract: a missing
//! explicit version is 404 with the available-versions context, while "no
//! raw files at all" is a 400 because the request itself cannot succeed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use dataprep_pipeline_domain::error::ErrorCategory;
use dataprep_pipeline_domain::PipelineError;

/// Error type for API handlers: a domain error with its taxonomy mapping,
/// or an authorization denial raised at the handler boundary.
#[derive(Debug)]
pub enum ApiError {
    Domain(PipelineError),
    Forbidden(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Domain(err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::NoRawFiles { .. } => StatusCode::BAD_REQUEST,
        PipelineError::NoRawFilesForVersion { .. } => StatusCode::NOT_FOUND,
        _ => match err.category() {
            ErrorCategory::Input => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Quota => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Dependency => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Processing | ErrorCategory::System => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Domain(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(code = err.code(), error = %err, "request failed");
                }
                let body = json!({
                    "detail": err.to_string(),
                    "code": err.code(),
                    "context": err.context(),
                });
                (status, Json(body)).into_response()
            }
            ApiError::Forbidden(detail) => forbidden(&detail),
        }
    }
}

/// Guard for mutating endpoints.
pub fn require_write(principal: &super::auth::Principal) -> Result<(), ApiError> {
    if principal.can_write() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "this action requires editor access".to_string(),
        ))
    }
}

/// 401 with the envelope shape, for auth failures before a domain error
/// exists.
pub fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "detail": detail,
            "code": "unauthorized",
            "context": null,
        })),
    )
        .into_response()
}

/// 403 with the envelope shape.
pub fn forbidden(detail: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "detail": detail,
            "code": "forbidden",
            "context": null,
        })),
    )
        .into_response()
}
