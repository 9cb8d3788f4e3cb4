//! Keyed window aggregator
//!
//! Count-based, non-overlapping windows per device. A buffer never holds N
//! samples outside the shard lock: the append that completes a window also
//! takes the batch and resets the buffer.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::config::MIN_WINDOW_SIZE;
use crate::models::TelemetrySample;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window size must be at least {min}, got {size}")]
    TooSmall { size: usize, min: usize },
}

/// Exactly N samples of one device, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedBatch {
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub rtts: Vec<i32>,
}

#[derive(Debug)]
struct WindowBuffer {
    started_at: DateTime<Utc>,
    rtts: Vec<i32>,
}

pub struct WindowAggregator {
    size: usize,
    buffers: DashMap<String, WindowBuffer>,
}

impl WindowAggregator {
    pub fn new(size: usize) -> Result<Self, WindowError> {
        if size < MIN_WINDOW_SIZE {
            return Err(WindowError::TooSmall { size, min: MIN_WINDOW_SIZE });
        }
        Ok(Self {
            size,
            buffers: DashMap::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Append one sample; returns the batch when this sample completes a window
    pub fn ingest(&self, sample: TelemetrySample) -> Option<CompletedBatch> {
        let (started_at, rtts) = match self.buffers.get_mut(&sample.device_id) {
            Some(mut buffer) => self.append(&mut buffer, &sample),
            None => {
                let mut buffer = self
                    .buffers
                    .entry(sample.device_id.clone())
                    .or_insert_with(|| WindowBuffer {
                        started_at: sample.observed_at,
                        rtts: Vec::with_capacity(self.size),
                    });
                self.append(&mut buffer, &sample)
            }
        }?;

        // a sample may have opened the next window in between
        self.buffers.remove_if(&sample.device_id, |_, b| b.rtts.is_empty());

        Some(CompletedBatch {
            device_id: sample.device_id,
            started_at,
            rtts,
        })
    }

    /// Push under the shard lock; takes the samples out once the window is full
    fn append(&self, buffer: &mut WindowBuffer, sample: &TelemetrySample) -> Option<(DateTime<Utc>, Vec<i32>)> {
        if buffer.rtts.is_empty() {
            buffer.started_at = sample.observed_at;
        }
        buffer.rtts.push(sample.rtt);

        if buffer.rtts.len() < self.size {
            return None;
        }
        Some((buffer.started_at, std::mem::take(&mut buffer.rtts)))
    }

    /// Samples waiting in a device's open window
    pub fn pending(&self, device_id: &str) -> usize {
        self.buffers.get(device_id).map(|b| b.rtts.len()).unwrap_or(0)
    }

    /// Devices with a partially filled window
    pub fn tracked_keys(&self) -> usize {
        self.buffers.iter().filter(|b| !b.rtts.is_empty()).count()
    }

    #[cfg(test)]
    fn buffered(&self, device_id: &str) -> Vec<i32> {
        self.buffers.get(device_id).map(|b| b.rtts.clone()).unwrap_or_default()
    }
}
