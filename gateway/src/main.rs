//! embed-dispatch - asynchronous text-embedding service.

use std::env;
use std::sync::Arc;

use embed_dispatch_common::{
    Broker, MemoryBroker, MemoryResultStore, ModelRegistry, QueueRouter, ResultStore,
};
use embed_dispatch_gateway::{app, logging, sweeper, AppState, Config};
use embed_worker::{EngineRegistry, WorkerPool};
use tokio::net::TcpListener;
use tokio::sync::watch;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("embed-dispatch {}", VERSION);
        return Ok(());
    }

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure config.toml exists or point EMBED_DISPATCH_CONFIG at a config file.",
            e
        )
    })?;

    logging::init_tracing(&config.logging.level);
    tracing::info!("Starting {} {}", config.service_name, VERSION);

    // Model registry and queue bindings
    let registry = Arc::new(ModelRegistry::from_configs(config.models.clone())?);
    for (model_key, queue) in QueueRouter::new(registry.clone()).bindings() {
        tracing::info!(model_key = %model_key, queue = %queue, "Model registered");
    }

    // Broker and result store must be reachable before accepting work
    let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
    let store: Arc<dyn ResultStore> = Arc::new(MemoryResultStore::new(config.store.result_ttl()));
    broker
        .ping()
        .await
        .map_err(|e| format!("Broker ({}) unreachable: {}", broker.broker_type(), e))?;
    store
        .ping()
        .await
        .map_err(|e| format!("Result store ({}) unreachable: {}", store.store_type(), e))?;
    tracing::info!(
        broker = broker.broker_type(),
        store = store.store_type(),
        ttl_secs = config.store.result_ttl_secs,
        "Broker and result store ready"
    );

    // Embedding engines for the models this process consumes
    let bound = config.worker.bound_models(&registry)?;
    if !config.worker.models.is_empty() {
        tracing::info!(models = ?config.worker.models, "Worker bound to selected models");
    }
    let engines = EngineRegistry::from_descriptors(bound, &config.engines).await?;
    for (model_key, health) in engines.health_report().await {
        match health {
            Ok(health) if health.is_healthy => {
                tracing::info!(model_key = %model_key, "Engine healthy");
            }
            Ok(_) => {
                tracing::warn!(model_key = %model_key, "Engine reachable but model not available");
            }
            Err(e) => {
                tracing::warn!(model_key = %model_key, "Engine health check failed: {}", e);
            }
        }
    }

    // Workers and background sweep
    let pool = WorkerPool::start(
        &registry,
        &engines,
        broker.clone(),
        store.clone(),
        &config.worker,
    )
    .await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweeper::spawn(store.clone(), config.store.sweep_interval(), shutdown_rx);

    // Build router
    let state = Arc::new(AppState::new(&config, registry, broker, store));
    let app = app(state);

    // Start server
    let addr = format!("{}:{}", config.api.host, config.api.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining workers");
    let _ = shutdown_tx.send(true);
    pool.shutdown().await;
    if let Err(e) = sweeper.await {
        tracing::warn!("Sweeper task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
}
