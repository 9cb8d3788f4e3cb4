//! Telemetry model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Reported device health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Online,
    Degraded,
    Offline,
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "ONLINE",
            DeviceStatus::Degraded => "DEGRADED",
            DeviceStatus::Offline => "OFFLINE",
            DeviceStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Inbound record as delivered by the transport or `POST /api/cpe/data`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[validate(length(min = 1))]
    pub device_id: String,
    pub status: DeviceStatus,
    #[validate(range(min = 0))]
    pub rtt: i32,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// One latency observation, folded into its device's window
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub device_id: String,
    pub rtt: i32,
    pub status: DeviceStatus,
    pub observed_at: DateTime<Utc>,
}

/// Latest status of a device, upserted by device id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusUpdate {
    pub device_id: String,
    pub status: DeviceStatus,
    /// Milliseconds since the Unix epoch
    pub last_updated: i64,
}

impl TelemetryRecord {
    pub fn observed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_else(Utc::now)
    }
}
