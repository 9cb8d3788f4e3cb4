//! CPE Latency Pipeline
//!
//! Turns raw round-trip-time reports from customer premises equipment into
//! packet-loss predictions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        CPE PIPELINE                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  MQTT cpe/raw-data/#  ─┐                                         │
//! │  POST /api/cpe/data   ─┴─► Ingest ─► Window ─► Extract           │
//! │                                                   │              │
//! │                                   round robin ────┤              │
//! │                                   ▼               ▼              │
//! │                         prediction #0     prediction #1          │
//! │                                   └──── callback pool ───┐       │
//! │                                                          ▼       │
//! │              cache  ◄──  Result Fan-out  ──►  /ws/alerts         │
//! │                                 │                                │
//! │                                 ▼                                │
//! │                           PostgreSQL                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod simulator;
pub mod transport;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use fanout::{BroadcastHub, LatestResultCache, StatusCache};
use pipeline::Pipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub results: LatestResultCache,
    pub statuses: StatusCache,
    pub hub: Arc<BroadcastHub>,
    pub pool: sqlx::PgPool,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Ingest
        .route("/api/cpe/data", post(handlers::ingest::submit))

        // Latest-result cache
        .route(
            "/api/cpe/cache/packetloss/:device_id",
            get(handlers::cache::get_latest).delete(handlers::cache::evict),
        )

        // Device history
        .route("/api/cpe/devices/:device_id/events", get(handlers::devices::events))
        .route("/api/cpe/devices/:device_id/status", get(handlers::devices::status));

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/ws/alerts", get(handlers::alerts::subscribe))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
