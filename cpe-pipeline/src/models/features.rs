//! Feature vector model
//!
//! Field names on the wire follow the prediction service's training columns:
//! `delay_1..delay_N`, `mean_delay`, `min_delay`, `mid_delay`, `max_delay`,
//! `range`, `mean_of_last_three`, `diff_between_last_two`, `slope_delay`.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Latency statistics of one completed window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub range: f64,
    pub mean_of_last_three: f64,
    pub diff_of_last_two: f64,
    pub slope: f64,
}

/// Summary of one window, consumed once by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub device_id: String,
    pub computed_at: DateTime<Utc>,
    /// Raw RTT values in arrival order
    pub delays: Vec<i32>,
    pub stats: WindowStats,
}

/// Body of a prediction call: the numeric fields of a [`FeatureVector`]
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub delays: Vec<i32>,
    pub stats: WindowStats,
}

/// Prediction service reply
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(rename = "hasPacketLoss", alias = "has_packet_loss")]
    pub has_packet_loss: bool,
}

impl From<&FeatureVector> for PredictionRequest {
    fn from(features: &FeatureVector) -> Self {
        Self {
            delays: features.delays.clone(),
            stats: features.stats,
        }
    }
}

fn serialize_numeric_fields<M: SerializeMap>(
    map: &mut M,
    delays: &[i32],
    stats: &WindowStats,
) -> Result<(), M::Error> {
    for (i, delay) in delays.iter().enumerate() {
        map.serialize_entry(&format!("delay_{}", i + 1), delay)?;
    }
    map.serialize_entry("mean_delay", &stats.mean)?;
    map.serialize_entry("min_delay", &stats.min)?;
    map.serialize_entry("mid_delay", &stats.median)?;
    map.serialize_entry("max_delay", &stats.max)?;
    map.serialize_entry("range", &stats.range)?;
    map.serialize_entry("mean_of_last_three", &stats.mean_of_last_three)?;
    map.serialize_entry("diff_between_last_two", &stats.diff_of_last_two)?;
    map.serialize_entry("slope_delay", &stats.slope)?;
    Ok(())
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.delays.len() + 10))?;
        map.serialize_entry("deviceId", &self.device_id)?;
        map.serialize_entry("aggregationTimestamp", &self.computed_at.timestamp_millis())?;
        serialize_numeric_fields(&mut map, &self.delays, &self.stats)?;
        map.end()
    }
}

impl Serialize for PredictionRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.delays.len() + 8))?;
        serialize_numeric_fields(&mut map, &self.delays, &self.stats)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureVector {
        FeatureVector {
            device_id: "cpe-device-001".into(),
            computed_at: DateTime::from_timestamp_millis(1_757_788_800_000).unwrap(),
            delays: vec![10, 12, 11, 15, 20],
            stats: WindowStats {
                mean: 13.6,
                min: 10.0,
                median: 11.0,
                max: 20.0,
                range: 10.0,
                mean_of_last_three: 46.0 / 3.0,
                diff_of_last_two: 5.0,
                slope: 2.3,
            },
        }
    }

    #[test]
    fn test_feature_vector_wire_format() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["deviceId"], "cpe-device-001");
        assert_eq!(json["aggregationTimestamp"], 1_757_788_800_000i64);
        assert_eq!(json["delay_1"], 10);
        assert_eq!(json["delay_5"], 20);
        assert_eq!(json["mid_delay"], 11.0);
        assert_eq!(json["slope_delay"], 2.3);
        assert_eq!(json["diff_between_last_two"], 5.0);
    }

    #[test]
    fn test_prediction_request_has_thirteen_fields() {
        let request = PredictionRequest::from(&sample());
        let json = serde_json::to_value(&request).unwrap();
        let fields = json.as_object().unwrap();
        assert_eq!(fields.len(), 13);
        assert!(!fields.contains_key("deviceId"));
        assert!(!fields.contains_key("aggregationTimestamp"));
    }

    #[test]
    fn test_response_accepts_both_spellings() {
        let camel: PredictionResponse = serde_json::from_str(r#"{"hasPacketLoss":true}"#).unwrap();
        let snake: PredictionResponse = serde_json::from_str(r#"{"has_packet_loss":false}"#).unwrap();
        assert!(camel.has_packet_loss);
        assert!(!snake.has_packet_loss);
    }
}
