//! Result fan-out
//!
//! Every prediction result goes to the outbound transport. Anomalies also go
//! to the latest-result cache, the broadcast hub and durable storage, in that
//! order, all from one shared value.

pub mod broadcast;
pub mod cache;
pub mod persistence;
pub mod store;

use std::sync::Arc;

use thiserror::Error;

use crate::dispatch::pool::CallbackError;
use crate::dispatch::ResultHandler;
use crate::models::PredictionResult;
use crate::transport::{publish_json, OutboundTopic, RecordSink};

pub use broadcast::{BroadcastHub, Subscription};
pub use cache::{CacheError, LatestResultCache, MemoryCache, ResultCache, StatusCache};
pub use persistence::{BufferedWriter, Persistence};
pub use store::{PgResultStore, ResultStore, StoreError};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("cache update failed for {device_id}: {source}")]
    Cache {
        device_id: String,
        #[source]
        source: CacheError,
    },

    #[error("result could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct ResultFanout<S> {
    sink: Arc<dyn RecordSink>,
    cache: LatestResultCache,
    hub: Arc<BroadcastHub>,
    persistence: Persistence<S>,
}

impl<S: ResultStore> ResultFanout<S> {
    pub fn new(
        sink: Arc<dyn RecordSink>,
        cache: LatestResultCache,
        hub: Arc<BroadcastHub>,
        persistence: Persistence<S>,
    ) -> Self {
        Self {
            sink,
            cache,
            hub,
            persistence,
        }
    }

    pub async fn fan_out(&self, result: PredictionResult) -> Result<(), FanoutError> {
        publish_json(
            self.sink.as_ref(),
            OutboundTopic::PredictionResults,
            &result.device_id,
            &result,
        );

        if !result.has_anomaly {
            tracing::debug!(device = %result.device_id, "no packet loss predicted");
            return Ok(());
        }

        tracing::info!(device = %result.device_id, "packet loss predicted");
        let result = Arc::new(result);

        // a failed cache write must not hold back the other sinks
        let cached = self.cache.update(&result);
        if let Err(e) = &cached {
            tracing::error!(device = %result.device_id, error = %e, "cache update failed");
        }

        let message: Arc<str> = serde_json::to_string(result.as_ref())?.into();
        let delivered = self.hub.publish(message);
        tracing::debug!(device = %result.device_id, observers = delivered, "alert broadcast");

        if let Err(e) = self.persistence.persist(&result).await {
            tracing::error!(device = %result.device_id, error = %e, "failed to persist packet loss event");
        }

        cached.map_err(|source| FanoutError::Cache {
            device_id: result.device_id.clone(),
            source,
        })
    }
}

impl<S: ResultStore> ResultHandler for ResultFanout<S> {
    async fn handle(&self, result: PredictionResult) -> Result<(), CallbackError> {
        self.fan_out(result).await?;
        Ok(())
    }
}
