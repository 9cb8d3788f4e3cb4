//! Latest-result cache administration

use axum::{extract::{State, Path}, Json};
use serde_json::{json, Value};

use crate::{AppState, AppResult, AppError};
use crate::models::PredictionResult;

fn require_device_id(device_id: &str) -> AppResult<&str> {
    let device_id = device_id.trim();
    if device_id.is_empty() {
        return Err(AppError::ValidationError("Device ID must not be empty".to_string()));
    }
    Ok(device_id)
}

/// Latest anomaly cached for a device
pub async fn get_latest(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<PredictionResult>> {
    let device_id = require_device_id(&device_id)?;

    let result = state.results
        .latest(device_id)?
        .ok_or_else(|| AppError::NotFound("No cached result for device".to_string()))?;

    Ok(Json(result))
}

/// Evict a device's cached result
pub async fn evict(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<Value>> {
    let device_id = require_device_id(&device_id)?;
    let removed = state.results.evict(device_id)?;

    tracing::info!(device = %device_id, removed, "cache entry evicted");

    Ok(Json(json!({
        "message": format!("Cached packet loss result cleared for device {}", device_id),
        "removed": removed,
    })))
}
