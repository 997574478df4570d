// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Server Binary
//!
//! Composition root: loads configuration, installs logging, wires the
//! `Services` bundle, and runs the API server alongside the pipeline
//! worker pool with coordinated graceful shutdown.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::Notify;

use dataprep_pipeline::application::{
    IngestCoordinator, PipelineOrchestrator, RunWorkerPool, Services,
};
use dataprep_pipeline::infrastructure::blob::{MemoryBlobStore, S3BlobStore};
use dataprep_pipeline::infrastructure::catalog::{schema, SqliteCatalog};
use dataprep_pipeline::infrastructure::config::AppConfig;
use dataprep_pipeline::infrastructure::embedding::{HashEmbedder, HttpEmbedder};
use dataprep_pipeline::infrastructure::metrics::MetricsService;
use dataprep_pipeline::infrastructure::vector::{HttpVectorIndex, MemoryVectorIndex};
use dataprep_pipeline::presentation::api::{
    self, ApiState, Role, SharedVerifier, StaticTokenVerifier,
};
use dataprep_pipeline::presentation::api::auth::JwtVerifier;
use dataprep_pipeline_bootstrap::shutdown::{spawn_signal_listener, ShutdownCoordinator};
use dataprep_pipeline_bootstrap::{init_tracing, ExitCode, LogFormat};
use dataprep_pipeline_domain::repositories::{BlobStore, Catalog, VectorIndex};
use dataprep_pipeline_domain::services::{Embedder, UnlimitedQuota};
use dataprep_pipeline_domain::value_objects::WorkspaceId;

#[derive(Parser)]
#[command(
    name = "dataprep-pipeline",
    about = "Versioned ingestion and staged preparation pipeline",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Override api.bind_addr.
    #[arg(long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and pipeline workers (default).
    Serve,
    /// Apply catalog migrations and exit.
    Migrate,
}

fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(mut cfg) => {
            if let Some(bind) = &cli.bind {
                cfg.api.bind_addr = bind.clone();
            }
            cfg
        }
        Err(err) => {
            eprintln!("configuration error: {}", err);
            ExitCode::ConfigError.exit();
        }
    };

    let format = match LogFormat::parse(&config.log.format) {
        Ok(format) => format,
        Err(err) => {
            eprintln!("configuration error: {}", err);
            ExitCode::ConfigError.exit();
        }
    };
    if let Err(err) = init_tracing(&config.log.level, format) {
        eprintln!("logging setup failed: {}", err);
        ExitCode::ConfigError.exit();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "tokio runtime failed to start");
            ExitCode::Software.exit();
        }
    };

    let code = runtime.block_on(async {
        match cli.command.unwrap_or(Command::Serve) {
            Command::Migrate => migrate(&config).await,
            Command::Serve => serve(config).await,
        }
    });
    code.exit();
}

async fn migrate(config: &AppConfig) -> ExitCode {
    match schema::initialize_database(&config.catalog.dsn).await {
        Ok(_) => {
            tracing::info!(dsn = %config.catalog.dsn, "catalog migrated");
            ExitCode::Success
        }
        Err(err) => {
            tracing::error!(error = %err, "migration failed");
            ExitCode::Unavailable
        }
    }
}

async fn serve(config: AppConfig) -> ExitCode {
    let catalog = match SqliteCatalog::connect(&config.catalog.dsn).await {
        Ok(catalog) => Arc::new(catalog),
        Err(err) => {
            tracing::error!(error = %err, "catalog unavailable");
            return ExitCode::Unavailable;
        }
    };

    let blob: Arc<dyn BlobStore> =
        if config.blob.endpoint.is_some() || config.blob.access_key.is_some() {
            Arc::new(S3BlobStore::from_config(&config.blob, "dataprep-").await)
        } else {
            tracing::warn!("no blob.endpoint configured; using the in-memory blob store");
            Arc::new(MemoryBlobStore::new())
        };

    let vectors: Arc<dyn VectorIndex> = match &config.vector.endpoint {
        Some(endpoint) => Arc::new(HttpVectorIndex::new(
            endpoint.clone(),
            config.vector.api_key.clone(),
        )),
        None => {
            tracing::warn!("no vector.endpoint configured; using the in-memory vector index");
            Arc::new(MemoryVectorIndex::new())
        }
    };

    let embedder: Arc<dyn Embedder> = match &config.embedding.endpoint {
        Some(endpoint) => Arc::new(HttpEmbedder::new(
            endpoint.clone(),
            config.embedding.api_key.clone(),
            config.embedding.model.clone(),
            config.embedding.dimension,
        )),
        None => {
            tracing::warn!("no embedding.endpoint configured; using the local hash embedder");
            Arc::new(HashEmbedder::new(config.embedding.dimension))
        }
    };

    let metrics = match MetricsService::new() {
        Ok(metrics) => metrics,
        Err(err) => {
            tracing::error!(error = %err, "metrics registry failed");
            return ExitCode::Software;
        }
    };

    let mut services = Services::new(
        catalog,
        blob,
        vectors,
        embedder,
        Arc::new(UnlimitedQuota),
        metrics,
    );
    services.tuning = config.tuning();
    services.ingest_concurrency = config.ingest.concurrency_per_source;
    let services = Arc::new(services);

    let verifier: SharedVerifier = match &config.auth.public_key_pem {
        Some(pem) => match JwtVerifier::from_pem(pem) {
            Ok(verifier) => Arc::new(verifier),
            Err(err) => {
                tracing::error!(error = %err, "auth key rejected");
                return ExitCode::ConfigError;
            }
        },
        None => {
            let workspace = WorkspaceId::new();
            let token = format!("dev-{}", workspace);
            tracing::warn!(
                workspace = %workspace,
                token = %token,
                "auth.public_key_pem not set; accepting only the generated dev token"
            );
            if let Err(err) = services
                .catalog
                .ensure_workspace(workspace, "dev")
                .await
            {
                tracing::error!(error = %err, "workspace bootstrap failed");
                return ExitCode::Unavailable;
            }
            Arc::new(StaticTokenVerifier::new().with_token(
                token,
                workspace,
                "dev",
                Role::Admin,
            ))
        }
    };

    let shutdown = ShutdownCoordinator::default();
    spawn_signal_listener(shutdown.clone());

    let wake = Arc::new(Notify::new());
    let orchestrator = PipelineOrchestrator::new(services.clone(), wake.clone());
    RunWorkerPool::new(services.clone(), config.pipeline.workers, wake).spawn(&shutdown);

    let state = ApiState {
        services: services.clone(),
        ingest: IngestCoordinator::new(services.clone()),
        orchestrator,
        verifier,
    };
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(&config.api.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %config.api.bind_addr, error = %err, "bind failed");
            return ExitCode::Unavailable;
        }
    };
    tracing::info!(addr = %config.api.bind_addr, "control api listening");

    let token = shutdown.token();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await;

    shutdown.initiate();
    let drained = shutdown.wait_for_drain().await;
    match served {
        Ok(()) if drained => ExitCode::Success,
        Ok(()) => ExitCode::Interrupted,
        Err(err) => {
            tracing::error!(error = %err, "server error");
            ExitCode::Error
        }
    }
}
