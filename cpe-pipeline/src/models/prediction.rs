//! Prediction result model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub device_id: String,
    #[serde(rename = "predictionTimestamp", with = "chrono::serde::ts_milliseconds")]
    pub produced_at: DateTime<Utc>,
    #[serde(rename = "hasPacketLoss")]
    pub has_anomaly: bool,
}

impl PredictionResult {
    pub fn new(device_id: impl Into<String>, has_anomaly: bool) -> Self {
        Self {
            device_id: device_id.into(),
            produced_at: Utc::now(),
            has_anomaly,
        }
    }
}
