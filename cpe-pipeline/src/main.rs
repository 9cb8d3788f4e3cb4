//! CPE Latency Pipeline server
//!
//! Wires the transport, pipeline, prediction dispatch and result fan-out
//! together and serves the HTTP API. See the library docs for the data flow.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cpe_pipeline::config::{Config, PersistenceMode};
use cpe_pipeline::dispatch::{CallbackPool, HttpPredictionClient, PredictionDispatcher};
use cpe_pipeline::fanout::{
    BroadcastHub, BufferedWriter, LatestResultCache, MemoryCache, Persistence, PgResultStore,
    ResultCache, ResultFanout, StatusCache,
};
use cpe_pipeline::pipeline::{spawn_status_writer, Pipeline, StatusTracker};
use cpe_pipeline::transport::{mqtt, DiscardSink, RecordSink};
use cpe_pipeline::{create_router, db, simulator, AppState};

const CALLBACK_GRACE: Duration = Duration::from_secs(5);
const STATUS_QUEUE_CAPACITY: usize = 1024;
const OBSERVER_QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    init_tracing(config.json_logs);

    tracing::info!("CPE pipeline starting...");
    tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));
    tracing::info!(
        window_size = config.window_size,
        endpoints = config.prediction_endpoints.len(),
        persistence = ?config.persistence,
        "pipeline configuration loaded"
    );

    if config.simulator_enabled && config.is_production() {
        tracing::warn!("Simulator enabled in production; synthetic records will be mixed with real ones");
    }

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let store = Arc::new(PgResultStore::new(pool.clone()));
    let cache_backend: Arc<dyn ResultCache> = Arc::new(MemoryCache::default());
    let results = LatestResultCache::new(cache_backend.clone());
    let statuses = StatusCache::new(cache_backend);
    let hub = Arc::new(BroadcastHub::new(OBSERVER_QUEUE_CAPACITY));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (flush_tx, flush_rx) = watch::channel(false);
    let (close_tx, close_rx) = watch::channel(false);

    // Transport
    let mqtt_parts = config.mqtt.as_ref().map(mqtt::connect);
    let sink: Arc<dyn RecordSink> = match &mqtt_parts {
        Some((client, _)) => Arc::new(mqtt::MqttSink::new(client.clone())),
        None => {
            tracing::info!("MQTT disabled, outbound records are discarded");
            Arc::new(DiscardSink)
        }
    };

    // Persistence
    let (persistence, flush_task) = match config.persistence {
        PersistenceMode::Direct => (Persistence::Direct(store.clone()), None),
        PersistenceMode::Buffered { flush_interval } => {
            let writer = Arc::new(BufferedWriter::new(store.clone()));
            let task = writer.clone().spawn_flush_task(flush_interval, flush_rx);
            (Persistence::Buffered(writer), Some(task))
        }
    };

    // Prediction dispatch
    let fanout = Arc::new(ResultFanout::new(sink.clone(), results.clone(), hub.clone(), persistence));
    let callbacks = CallbackPool::spawn(config.callback_workers, config.callback_queue_capacity);

    let clients = config
        .prediction_endpoints
        .iter()
        .cloned()
        .map(HttpPredictionClient::new)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to build prediction clients")?;
    let dispatcher = PredictionDispatcher::new(clients, callbacks.handle(), fanout)
        .context("Failed to build prediction dispatcher")?;

    // Pipeline
    let (status_tx, status_rx) = mpsc::channel(STATUS_QUEUE_CAPACITY);
    let status_writer = spawn_status_writer(store, status_rx);

    let pipeline = Arc::new(
        Pipeline::new(
            config.window_size,
            Arc::new(dispatcher),
            sink,
            StatusTracker::new(statuses.clone(), status_tx),
        )
        .context("Failed to build pipeline")?,
    );

    // Inbound sources; the MQTT loop also carries outbound records until close
    let mqtt_task = mqtt_parts.map(|(client, eventloop)| {
        mqtt::spawn_listener(client, eventloop, pipeline.clone(), shutdown_rx.clone(), close_rx)
    });
    let mut sources: Vec<JoinHandle<()>> = Vec::new();
    if config.simulator_enabled {
        sources.push(simulator::spawn(pipeline.clone(), shutdown_rx.clone()));
    }

    // Build application state
    let state = AppState {
        pipeline,
        results,
        statuses,
        hub,
        pool,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop inbound sources, then drain in order: callbacks, transport, flush, status writes
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    for source in sources {
        let _ = source.await;
    }

    callbacks.shutdown(CALLBACK_GRACE).await;

    let _ = close_tx.send(true);
    if let Some(task) = mqtt_task {
        let _ = task.await;
    }

    let _ = flush_tx.send(true);
    if let Some(task) = flush_task {
        let _ = task.await;
    }

    if tokio::time::timeout(CALLBACK_GRACE, status_writer).await.is_err() {
        tracing::warn!("Status writer did not finish in time");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cpe_pipeline=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
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
}
