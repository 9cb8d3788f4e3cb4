//! Telemetry ingest handler

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::pipeline::Ingested;
use crate::{AppResult, AppState};

/// Accept one raw record, same format as the MQTT feed
pub async fn submit(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    let body = match state.pipeline.ingest_payload(&body)? {
        Ingested::Buffered { pending } => json!({
            "message": "Record accepted",
            "pending": pending,
        }),
        Ingested::Emitted { device_id, endpoint } => json!({
            "message": format!("Window complete for {}", device_id),
            "pending": 0,
            "endpoint": endpoint,
        }),
    };

    Ok((StatusCode::ACCEPTED, Json(body)))
}
