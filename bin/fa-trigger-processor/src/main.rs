//! FieldAudit Trigger Processor
//!
//! Hosts the audit triggers: one change stream watcher per watched
//! collection, each routing create/update/delete events to the audit
//! handlers. Serves `/health`, `/ready` and `/metrics`.
//!
//! Configuration comes from `config.toml` (or `FIELDAUDIT_CONFIG`) with
//! `FIELDAUDIT_*` environment overrides; see `fa-config`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mongodb::bson::doc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use fa_audit::{ActorResolver, AuditLogWriter, MongoAuditLogStore, MongoUserDirectory};
use fa_config::{AppConfig, ConfigLoader};
use fa_stream::{
    AuditTrigger, ChangeStreamWatcher, CheckpointStore, CollectionInitializer, InitConfig,
    MemoryCheckpointStore, MongoCheckpointStore, StreamProcessor, TriggerRegistry, WatcherConfig,
};

#[derive(Clone)]
struct AppState {
    db: mongodb::Database,
    prometheus: PrometheusHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    fa_common::logging::init_logging("fa-trigger-processor");

    info!("Starting FieldAudit Trigger Processor");

    let config = ConfigLoader::new().load()?;
    let prometheus = PrometheusBuilder::new().install_recorder()?;

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    info!("Connecting to MongoDB: {}", config.mongodb.database);
    let client = mongodb::Client::with_uri_str(&config.mongodb.uri).await?;
    let db = client.database(&config.mongodb.database);

    let init = CollectionInitializer::with_config(
        db.clone(),
        InitConfig {
            audit_collection: config.triggers.audit_collection.clone(),
            checkpoints_collection: config.triggers.checkpoint_collection.clone(),
            enable_pre_images: config.triggers.ensure_pre_images,
            ..Default::default()
        },
    )
    .init_all()
    .await;
    if !init.is_success() {
        warn!(warnings = ?init.warnings, "Collection initialization finished with warnings");
    }

    let registry = Arc::new(build_registry(&client, &config));
    info!(handlers = registry.handler_names().len(), "Trigger handlers registered");

    let checkpoint_store = build_checkpoint_store(&client, &config)?;
    let mut processor = StreamProcessor::new();
    for collection in registry.collections() {
        let watcher_config = WatcherConfig::for_collection(&config.mongodb.database, collection)
            .with_backoff(config.triggers.initial_backoff_ms, config.triggers.max_backoff_ms);
        processor.add_watcher(Box::new(ChangeStreamWatcher::new(
            client.clone(),
            watcher_config,
            checkpoint_store.clone(),
            registry.clone(),
        )));
    }

    let stream_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = processor.start() => {
                    error!("All change stream watchers stopped");
                }
                _ = shutdown_rx.recv() => {
                    info!("Trigger watchers shutting down");
                }
            }
        })
    };

    // Start health/metrics server
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    info!("Metrics server listening on http://{}/metrics", addr);

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(AppState { db, prometheus });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let http_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("FieldAudit Trigger Processor started");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        let _ = stream_handle.await;
        let _ = http_handle.await;
    })
    .await;

    info!("FieldAudit Trigger Processor shutdown complete");
    Ok(())
}

fn build_registry(client: &mongodb::Client, config: &AppConfig) -> TriggerRegistry {
    let database = &config.mongodb.database;
    let directory = Arc::new(MongoUserDirectory::new(
        client,
        database,
        &config.triggers.users_collection,
    ));
    let store = Arc::new(MongoAuditLogStore::new(
        client.clone(),
        database,
        &config.triggers.audit_collection,
    ));

    let trigger = AuditTrigger::new(ActorResolver::new(directory), AuditLogWriter::new(store));
    TriggerRegistry::for_watched_collections(Arc::new(trigger))
}

fn build_checkpoint_store(
    client: &mongodb::Client,
    config: &AppConfig,
) -> Result<Arc<dyn CheckpointStore>> {
    match config.triggers.checkpoint_store.as_str() {
        "mongodb" => Ok(Arc::new(MongoCheckpointStore::new(
            client,
            &config.mongodb.database,
            &config.triggers.checkpoint_collection,
        ))),
        "memory" => {
            warn!("Using in-memory checkpoints; watchers restart from the current position");
            Ok(Arc::new(MemoryCheckpointStore::new()))
        }
        other => anyhow::bail!("unknown checkpoint store: {}", other),
    }
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.prometheus.render()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "READY" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "NOT_READY", "error": e.to_string() })),
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
