//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    window_size: usize,
    tracked_devices: usize,
    cached_anomalies: usize,
    observers: usize,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        window_size: state.pipeline.window_size(),
        tracked_devices: state.pipeline.tracked_devices(),
        cached_anomalies: state.results.len(),
        observers: state.hub.observer_count(),
    })
}
