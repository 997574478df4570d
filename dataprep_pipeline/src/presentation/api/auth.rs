// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bearer-Token Authentication
//!
//! Every endpoint is workspace-scoped through the authenticated principal.
//! The auth collaborator issues the tokens; this module only verifies them
//! and extracts `{workspace, user, role}`.
//!
//! Two verifiers exist: [`JwtVerifier`] (RS256 against the configured
//! public key) for real deployments, and [`StaticTokenVerifier`] mapping
//! fixed opaque tokens to principals for tests and keyless dev setups.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use dataprep_pipeline_domain::value_objects::WorkspaceId;

use super::error::unauthorized;
use super::ApiState;

/// Role of the authenticated user inside the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub workspace_id: WorkspaceId,
    pub subject: String,
    pub role: Role,
}

impl Principal {
    /// Whether the principal may mutate workspace state.
    pub fn can_write(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Editor)
    }
}

/// Verifies bearer tokens into principals.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Principal, String>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    workspace_id: String,
    role: Role,
    #[allow(dead_code)]
    exp: usize,
}

/// RS256 verifier against the configured PEM public key.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_pem(pem: &str) -> Result<Self, String> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| format!("invalid auth public key: {}", e))?;
        Ok(Self {
            key,
            validation: Validation::new(Algorithm::RS256),
        })
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Principal, String> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| format!("token rejected: {}", e))?;
        let workspace_id = WorkspaceId::from_str(&data.claims.workspace_id)
            .map_err(|_| "token carries a malformed workspace id".to_string())?;
        Ok(Principal {
            workspace_id,
            subject: data.claims.sub,
            role: data.claims.role,
        })
    }
}

/// Fixed token → principal map for tests and keyless dev runs.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        token: impl Into<String>,
        workspace_id: WorkspaceId,
        subject: impl Into<String>,
        role: Role,
    ) -> Self {
        self.tokens.insert(
            token.into(),
            Principal {
                workspace_id,
                subject: subject.into(),
                role,
            },
        );
        self
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Principal, String> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| "unknown token".to_string())
    }
}

#[axum::async_trait]
impl FromRequestParts<ApiState> for Principal {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("missing Authorization header"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("expected a bearer token"))?;
        state
            .verifier
            .verify(token)
            .map_err(|reason| unauthorized(&reason))
    }
}

/// Shared handle used in the router state.
pub type SharedVerifier = Arc<dyn TokenVerifier>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_verifier_round_trip() {
        let ws = WorkspaceId::new();
        let verifier =
            StaticTokenVerifier::new().with_token("secret", ws, "tester", Role::Editor);
        let principal = verifier.verify("secret").unwrap();
        assert_eq!(principal.workspace_id, ws);
        assert!(principal.can_write());
        assert!(verifier.verify("other").is_err());
    }

    #[test]
    fn test_viewer_cannot_write() {
        let ws = WorkspaceId::new();
        let verifier = StaticTokenVerifier::new().with_token("ro", ws, "viewer", Role::Viewer);
        assert!(!verifier.verify("ro").unwrap().can_write());
    }
}
