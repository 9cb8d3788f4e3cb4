//! Ingestion filter
//!
//! Decodes and validates inbound records, then splits each record into the
//! two streams it feeds: device status and latency.

use thiserror::Error;
use validator::Validate;

use crate::models::{DeviceStatusUpdate, TelemetryRecord, TelemetrySample};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("undecodable payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Output of [`split`], tagged by destination
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Status(DeviceStatusUpdate),
    Latency(TelemetrySample),
}

pub fn decode(payload: &[u8]) -> Result<TelemetryRecord, IngestError> {
    let record: TelemetryRecord = serde_json::from_slice(payload)?;
    record.validate()?;
    Ok(record)
}

pub fn split(record: TelemetryRecord) -> [Routed; 2] {
    let observed_at = record.observed_at();
    let status = DeviceStatusUpdate {
        device_id: record.device_id.clone(),
        status: record.status,
        last_updated: record.timestamp,
    };
    let sample = TelemetrySample {
        device_id: record.device_id,
        rtt: record.rtt,
        status: record.status,
        observed_at,
    };
    [Routed::Status(status), Routed::Latency(sample)]
}
