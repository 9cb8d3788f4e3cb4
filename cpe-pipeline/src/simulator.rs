//! Demo record generator
//!
//! Feeds one random record per second into the pipeline, cycling over a small
//! fixed fleet. Meant for local runs without a broker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{DeviceStatus, TelemetryRecord};
use crate::pipeline::Pipeline;

const DEVICES: [&str; 5] = [
    "cpe-device-001",
    "cpe-device-002",
    "cpe-device-003",
    "cpe-device-004",
    "cpe-device-005",
];

// weighted towards healthy devices
const STATUSES: [DeviceStatus; 5] = [
    DeviceStatus::Online,
    DeviceStatus::Online,
    DeviceStatus::Online,
    DeviceStatus::Degraded,
    DeviceStatus::Offline,
];

pub fn random_record<R: Rng>(rng: &mut R) -> TelemetryRecord {
    TelemetryRecord {
        device_id: DEVICES.choose(rng).copied().unwrap_or(DEVICES[0]).to_string(),
        status: STATUSES.choose(rng).copied().unwrap_or(DeviceStatus::Online),
        rtt: rng.gen_range(10..100),
        timestamp: Utc::now().timestamp_millis(),
    }
}

pub fn spawn(pipeline: Arc<Pipeline>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        tracing::info!(devices = DEVICES.len(), "simulator started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let record = random_record(&mut rng);
                    tracing::trace!(device = %record.device_id, rtt = record.rtt, "simulated record");
                    match serde_json::to_vec(&record) {
                        Ok(payload) => {
                            let _ = pipeline.ingest_payload(&payload);
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to encode simulated record"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("simulator stopped");
    })
}
