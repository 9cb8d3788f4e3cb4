//! Key-value cache for latest results and device statuses

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::models::{DeviceStatusUpdate, PredictionResult};

/// Hash-style namespace for the latest anomaly per device
pub const LATEST_PACKET_LOSS_NAMESPACE: &str = "cpe:latest_packetloss_events:";

/// Namespace for the latest reported status per device
pub const DEVICE_STATUS_NAMESPACE: &str = "device:statuses:";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value could not be encoded: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Last-writer-wins string store
pub trait ResultCache: Send + Sync {
    fn put(&self, key: String, value: String) -> Result<(), CacheError>;
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn remove(&self, key: &str) -> Result<bool, CacheError>;
    fn len(&self) -> usize;
    fn count_prefix(&self, prefix: &str) -> usize;
}

/// In-process cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
}

impl ResultCache for MemoryCache {
    fn put(&self, key: String, value: String) -> Result<(), CacheError> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn count_prefix(&self, prefix: &str) -> usize {
        self.entries.iter().filter(|e| e.key().starts_with(prefix)).count()
    }
}

/// Latest anomalous prediction per device
#[derive(Clone)]
pub struct LatestResultCache {
    inner: Arc<dyn ResultCache>,
}

impl LatestResultCache {
    pub fn new(inner: Arc<dyn ResultCache>) -> Self {
        Self { inner }
    }

    pub fn key(device_id: &str) -> String {
        format!("{LATEST_PACKET_LOSS_NAMESPACE}{device_id}")
    }

    pub fn update(&self, result: &PredictionResult) -> Result<(), CacheError> {
        let value = serde_json::to_string(result)?;
        self.inner.put(Self::key(&result.device_id), value)
    }

    pub fn latest(&self, device_id: &str) -> Result<Option<PredictionResult>, CacheError> {
        match self.inner.get(&Self::key(device_id))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Returns whether an entry existed
    pub fn evict(&self, device_id: &str) -> Result<bool, CacheError> {
        self.inner.remove(&Self::key(device_id))
    }

    /// Devices with a cached anomaly
    pub fn len(&self) -> usize {
        self.inner.count_prefix(LATEST_PACKET_LOSS_NAMESPACE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<dyn ResultCache>,
}

impl StatusCache {
    pub fn new(inner: Arc<dyn ResultCache>) -> Self {
        Self { inner }
    }

    pub fn update(&self, update: &DeviceStatusUpdate) -> Result<(), CacheError> {
        let value = serde_json::to_string(update)?;
        self.inner.put(format!("{DEVICE_STATUS_NAMESPACE}{}", update.device_id), value)
    }

    pub fn get(&self, device_id: &str) -> Result<Option<DeviceStatusUpdate>, CacheError> {
        match self.inner.get(&format!("{DEVICE_STATUS_NAMESPACE}{device_id}"))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}
