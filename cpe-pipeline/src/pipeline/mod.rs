//! Telemetry pipeline
//!
//! ```text
//! payload ─► ingest::decode ─► split ─┬─► Status  ─► StatusTracker
//!                                     └─► Latency ─► WindowAggregator
//!                                                      │ (N samples)
//!                                                      ▼
//!                                  FeatureExtractor ─► features topic
//!                                                      │
//!                                                      ▼
//!                                                  Dispatch
//! ```

pub mod extract;
pub mod ingest;
pub mod status;
pub mod window;


use std::sync::Arc;

use thiserror::Error;

use crate::dispatch::Dispatch;
use crate::models::{TelemetryRecord, TelemetrySample};
use crate::transport::{publish_json, OutboundTopic, RecordSink};

pub use extract::{ExtractError, FeatureExtractor};
pub use ingest::{IngestError, Routed};
pub use status::{spawn_status_writer, StatusTracker};
pub use window::{CompletedBatch, WindowAggregator, WindowError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// What happened to one accepted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// Sample is waiting in its device's open window
    Buffered { pending: usize },
    /// Sample completed a window; the feature vector went to `endpoint`
    Emitted { device_id: String, endpoint: usize },
}

pub struct Pipeline {
    aggregator: WindowAggregator,
    extractor: FeatureExtractor,
    dispatcher: Arc<dyn Dispatch>,
    sink: Arc<dyn RecordSink>,
    status: StatusTracker,
}

impl Pipeline {
    pub fn new(
        window_size: usize,
        dispatcher: Arc<dyn Dispatch>,
        sink: Arc<dyn RecordSink>,
        status: StatusTracker,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            aggregator: WindowAggregator::new(window_size)?,
            extractor: FeatureExtractor::new(window_size)?,
            dispatcher,
            sink,
            status,
        })
    }

    /// Decode one raw record and run it through the pipeline.
    ///
    /// Malformed payloads are logged and returned as errors; nothing
    /// downstream sees them.
    pub fn ingest_payload(&self, payload: &[u8]) -> Result<Ingested, PipelineError> {
        let record = ingest::decode(payload).map_err(|e| {
            tracing::warn!(bytes = payload.len(), error = %e, "dropping malformed record");
            e
        })?;
        self.ingest_record(record)
    }

    pub fn ingest_record(&self, record: TelemetryRecord) -> Result<Ingested, PipelineError> {
        let mut outcome = Ingested::Buffered { pending: 0 };

        for routed in ingest::split(record) {
            match routed {
                Routed::Status(update) => self.status.record(update),
                Routed::Latency(sample) => outcome = self.window(sample)?,
            }
        }

        Ok(outcome)
    }

    fn window(&self, sample: TelemetrySample) -> Result<Ingested, PipelineError> {
        let device_id = sample.device_id.clone();

        let Some(batch) = self.aggregator.ingest(sample) else {
            let pending = self.aggregator.pending(&device_id);
            tracing::trace!(device = %device_id, pending, "sample buffered");
            return Ok(Ingested::Buffered { pending });
        };

        let features = self.extractor.extract(&batch)?;
        tracing::debug!(
            device = %features.device_id,
            mean = features.stats.mean,
            slope = features.stats.slope,
            "window complete"
        );

        publish_json(self.sink.as_ref(), OutboundTopic::Features, &device_id, &features);
        let endpoint = self.dispatcher.dispatch(features);

        Ok(Ingested::Emitted { device_id, endpoint })
    }

    pub fn window_size(&self) -> usize {
        self.aggregator.size()
    }

    /// Devices with a partially filled window
    pub fn tracked_devices(&self) -> usize {
        self.aggregator.tracked_keys()
    }
}
