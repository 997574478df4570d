// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Control API tests: auth, the error envelope, and the endpoint contracts.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use dataprep_pipeline::presentation::api::{
    self, ApiState, Role, StaticTokenVerifier,
};
use dataprep_pipeline_domain::repositories::Catalog;

use crate::common::TestEnv;

const EDITOR_TOKEN: &str = "editor-token";
const VIEWER_TOKEN: &str = "viewer-token";

async fn build_app(env: &TestEnv) -> Router {
    let verifier = StaticTokenVerifier::new()
        .with_token(EDITOR_TOKEN, env.workspace_id, "editor", Role::Editor)
        .with_token(VIEWER_TOKEN, env.workspace_id, "viewer", Role::Viewer);
    api::router(ApiState {
        services: env.services.clone(),
        ingest: env.ingest.clone(),
        orchestrator: env.orchestrator.clone(),
        verifier: Arc::new(verifier),
    })
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

#[tokio::test]
async fn test_requests_require_bearer_token() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;

    let (status, body) = send(&app, "GET", "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send(
        &app,
        "GET",
        "/api/v1/products",
        Some("unknown-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_and_metrics_are_open() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;

    let (status, body) = send(&app, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));

    let (status, _) = send(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_product_crud_and_name_conflict() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;

    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/products",
        Some(EDITOR_TOKEN),
        Some(json!({ "name": "handbook", "description": "docs" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "DRAFT");
    assert_eq!(created["current_version"], 0);

    // Name conflict inside the workspace.
    let (status, conflict) = send(
        &app,
        "POST",
        "/api/v1/products",
        Some(EDITOR_TOKEN),
        Some(json!({ "name": "handbook" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "duplicate_key");

    let (status, listed) = send(&app, "GET", "/api/v1/products", Some(VIEWER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/v1/products/{}", product_id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail["chunking_config"]["target_tokens"].is_number());

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/v1/products/{}", product_id),
        Some(EDITOR_TOKEN),
        Some(json!({ "description": "employee docs" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["description"], "employee docs");

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/v1/products/{}", product_id),
        Some(EDITOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/v1/products/{}", product_id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_viewers_cannot_mutate() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/products",
        Some(VIEWER_TOKEN),
        Some(json!({ "name": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn test_invalid_data_source_config_rejected() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;
    let product = env.create_product("sources").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/datasources",
        Some(EDITOR_TOKEN),
        Some(json!({
            "product_id": product.id.to_string(),
            "type": "WEB",
            "config": { "urls": [] }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}

#[tokio::test]
async fn test_trigger_error_envelopes() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;
    let product = env.create_product("envelope").await;

    // No raw files at all: 400.
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/pipeline/run",
        Some(EDITOR_TOKEN),
        Some(json!({ "product_id": product.id.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "no_raw_files");
    assert!(body["detail"].is_string());

    // Seed one version, then ask for a missing one: 404 with hints.
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/pipeline/run",
        Some(EDITOR_TOKEN),
        Some(json!({ "product_id": product.id.to_string(), "version": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "no_raw_files_for_version");
    assert_eq!(body["context"]["requested_version"], 5);
    assert_eq!(body["context"]["available_versions"], json!([1]));
    assert_eq!(body["context"]["latest_ingested_version"], 1);
}

#[tokio::test]
async fn test_ingest_and_trigger_through_api() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;
    let product = env.create_product("api-flow").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;

    let (status, summary) = send(
        &app,
        "POST",
        "/api/v1/ingest",
        Some(EDITOR_TOKEN),
        Some(json!({ "product_id": product.id.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["version"], 1);
    assert_eq!(summary["ingested"], 2);

    let (status, run) = send(
        &app,
        "POST",
        "/api/v1/pipeline/run",
        Some(EDITOR_TOKEN),
        Some(json!({ "product_id": product.id.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["version"], 1);
    assert_eq!(run["version_source"], "auto");
    assert_eq!(run["status"], "QUEUED");
    let run_id = run["run_id"].as_str().unwrap().to_string();

    // Immediate duplicate trigger conflicts and leaves one active run.
    let (status, conflict) = send(
        &app,
        "POST",
        "/api/v1/pipeline/run",
        Some(EDITOR_TOKEN),
        Some(json!({ "product_id": product.id.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "run_already_active");

    let (status, runs) = send(
        &app,
        "GET",
        &format!("/api/v1/pipeline/runs?product_id={}", product.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 1);

    // Cancel the queued run, then execute: every stage skips.
    let (status, cancelled) = send(
        &app,
        "POST",
        &format!("/api/v1/pipeline/runs/{}/cancel", run_id),
        Some(EDITOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["cancel_requested"], true);

    let claimed = env.services.catalog.claim_queued_run().await.unwrap().unwrap();
    env.executor.execute(claimed).await.unwrap();

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/v1/pipeline/runs/{}", run_id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "CANCELLED");

    // Cancelling a terminal run is a conflict.
    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/pipeline/runs/{}/cancel", run_id),
        Some(EDITOR_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn test_run_detail_artifacts_and_insights_after_success() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;
    let product = env.create_product("insights").await;
    let dir = env.write_corpus().await;
    env.folder_source(&product, dir.path().to_str().unwrap()).await;
    env.ingest_all(&product).await.unwrap();
    let (run, _, _) = env.trigger_and_execute(&product, None, false).await.unwrap();

    let (status, detail) = send(
        &app,
        "GET",
        &format!("/api/v1/pipeline/runs/{}", run.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "SUCCEEDED");
    assert_eq!(
        detail["stages"].as_array().unwrap().len(),
        dataprep_pipeline_domain::entities::StageName::DAG.len()
    );

    let (status, artifacts) = send(
        &app,
        "GET",
        &format!("/api/v1/pipeline/runs/{}/artifacts", run.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let artifacts = artifacts.as_array().unwrap();
    assert!(!artifacts.is_empty());
    assert!(artifacts.iter().all(|a| a["download_url"].is_string()));

    // Inline artifact bytes round-trip.
    let fingerprint = artifacts
        .iter()
        .find(|a| a["name"] == "fingerprint.json")
        .unwrap();
    let (status, content) = send(
        &app,
        "GET",
        &format!(
            "/api/v1/pipeline/artifacts/{}/content",
            fingerprint["id"].as_str().unwrap()
        ),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(content["ai_trust_score"].is_number());

    let (status, insights) = send(
        &app,
        "GET",
        &format!("/api/v1/insights/{}", product.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(insights["fingerprint"]["ai_trust_score"].is_number());
    assert!(insights["recommendations"].as_array().unwrap().len() >= 1);

    // Chunk drill-down respects the page cap.
    let (status, chunks) = send(
        &app,
        "GET",
        &format!("/api/v1/chunks/{}?limit=9999", product.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chunks["limit"], 500);
    assert!(chunks["count"].as_u64().unwrap() > 0);

    let (status, logs) = send(
        &app,
        "GET",
        &format!("/api/v1/pipeline/runs/{}/logs", run.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(logs["stages"].as_array().unwrap().iter().any(|s| {
        s["stage"] == "indexing" && s["metrics"]["embedded_count"].is_number()
    }));
}

#[tokio::test]
async fn test_quality_rules_round_trip() {
    let env = TestEnv::new().await;
    let app = build_app(&env).await;
    let product = env.create_product("rules-api").await;

    let (status, rules) = send(
        &app,
        "GET",
        &format!("/api/v1/data-quality/rules/{}", product.id),
        Some(VIEWER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rules["version"], 0);

    let (status, stored) = send(
        &app,
        "PUT",
        &format!("/api/v1/data-quality/rules/{}", product.id),
        Some(EDITOR_TOKEN),
        Some(json!({
            "content_length_rules": [{
                "name": "length",
                "severity": "WARNING",
                "min_chars": 10,
                "max_chars": 5000
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["version"], 1);
    assert_eq!(stored["rule_count"], 1);

    // A fatal rule below ERROR severity is invalid.
    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/v1/data-quality/rules/{}", product.id),
        Some(EDITOR_TOKEN),
        Some(json!({
            "content_length_rules": [{
                "name": "bad",
                "severity": "WARNING",
                "fatal": true,
                "min_chars": 10,
                "max_chars": 5000
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_input");
}
