//! Device status stream
//!
//! Statuses go to the cache right away and to the database through a single
//! background writer, so a slow database never stalls ingestion.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::fanout::{ResultStore, StatusCache};
use crate::models::DeviceStatusUpdate;

pub struct StatusTracker {
    cache: StatusCache,
    writer: mpsc::Sender<DeviceStatusUpdate>,
}

impl StatusTracker {
    pub fn new(cache: StatusCache, writer: mpsc::Sender<DeviceStatusUpdate>) -> Self {
        Self { cache, writer }
    }

    pub fn record(&self, update: DeviceStatusUpdate) {
        if let Err(e) = self.cache.update(&update) {
            tracing::warn!(device = %update.device_id, error = %e, "failed to cache device status");
        }

        match self.writer.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                tracing::warn!(device = %update.device_id, "status writer backlogged, update skipped");
            }
            Err(TrySendError::Closed(update)) => {
                tracing::debug!(device = %update.device_id, "status writer stopped");
            }
        }
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }
}

/// Persist status updates until every sender is dropped
pub fn spawn_status_writer<S: ResultStore>(
    store: Arc<S>,
    mut updates: mpsc::Receiver<DeviceStatusUpdate>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if let Err(e) = store.upsert_status(&update).await {
                tracing::error!(device = %update.device_id, error = %e, "failed to persist device status");
            }
        }
        tracing::debug!("status writer stopped");
    })
}
