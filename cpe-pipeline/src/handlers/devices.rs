//! Device history handlers

use axum::{extract::{State, Path, Query}, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppState, AppResult, AppError};
use crate::models::{DeviceStatusRow, PacketLossEvent};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// Persisted packet loss events, newest first
pub async fn events(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<PacketLossEvent>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let events = PacketLossEvent::list_by_device(&state.pool, &device_id, limit).await?;
    Ok(Json(events))
}

/// Latest status, from the cache when present
pub async fn status(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> AppResult<Json<Value>> {
    if let Some(cached) = state.statuses.get(&device_id)? {
        return Ok(Json(json!({
            "deviceId": cached.device_id,
            "status": cached.status,
            "lastUpdated": cached.last_updated,
            "source": "cache",
        })));
    }

    let row = DeviceStatusRow::find_by_device(&state.pool, &device_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

    Ok(Json(json!({
        "deviceId": row.device_id,
        "status": row.status,
        "lastUpdated": row.last_updated,
        "source": "database",
    })))
}
