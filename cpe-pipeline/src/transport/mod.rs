//! Message transport seam
//!
//! Inbound records arrive through [`mqtt::spawn_listener`] (or the HTTP ingest
//! handler); outbound feature vectors and prediction results leave through a
//! [`RecordSink`], keyed by device id.

pub mod mqtt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport rejected record: {0}")]
    Transport(String),
}

/// Outbound record streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundTopic {
    Features,
    PredictionResults,
}

impl OutboundTopic {
    pub fn prefix(&self) -> &'static str {
        match self {
            OutboundTopic::Features => "cpe/features",
            OutboundTopic::PredictionResults => "cpe/prediction-results",
        }
    }

    /// Per-device topic, so the broker keeps each device's records in order
    pub fn topic_for(&self, key: &str) -> String {
        format!("{}/{}", self.prefix(), key)
    }
}

/// Accepts pipeline outputs without blocking the caller
pub trait RecordSink: Send + Sync {
    fn publish(&self, topic: OutboundTopic, key: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

/// Sink used when no broker is configured
#[derive(Debug, Default)]
pub struct DiscardSink;

impl RecordSink for DiscardSink {
    fn publish(&self, topic: OutboundTopic, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        tracing::trace!(topic = topic.prefix(), key, bytes = payload.len(), "transport disabled, record discarded");
        Ok(())
    }
}

/// Serialize and publish, logging failures. Outbound records are best-effort.
pub fn publish_json<T: Serialize>(sink: &dyn RecordSink, topic: OutboundTopic, key: &str, value: &T) {
    let outcome = serde_json::to_vec(value)
        .map_err(SinkError::from)
        .and_then(|payload| sink.publish(topic, key, payload));

    if let Err(e) = outcome {
        tracing::warn!(topic = topic.prefix(), key, error = %e, "failed to publish outbound record");
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records every publish for later inspection
    #[derive(Default)]
    pub struct RecordingSink {
        pub records: Mutex<Vec<(OutboundTopic, String, serde_json::Value)>>,
    }

    impl RecordingSink {
        pub fn on(&self, topic: OutboundTopic) -> Vec<(String, serde_json::Value)> {
            self.records
                .lock()
                .iter()
                .filter(|(t, _, _)| *t == topic)
                .map(|(_, key, value)| (key.clone(), value.clone()))
                .collect()
        }
    }

    impl RecordSink for RecordingSink {
        fn publish(&self, topic: OutboundTopic, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
            let value = serde_json::from_slice(&payload)?;
            self.records.lock().push((topic, key.to_string(), value));
            Ok(())
        }
    }
}
