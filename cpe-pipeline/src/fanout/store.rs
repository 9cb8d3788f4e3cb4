//! Durable storage for anomaly events and device statuses

use std::future::Future;

use sqlx::PgPool;
use thiserror::Error;

use crate::models::{DeviceStatusRow, DeviceStatusUpdate, NewPacketLossEvent, PacketLossEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub trait ResultStore: Send + Sync + 'static {
    fn insert_event(
        &self,
        event: &NewPacketLossEvent,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns rows written
    fn insert_events(
        &self,
        events: &[NewPacketLossEvent],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn upsert_status(
        &self,
        update: &DeviceStatusUpdate,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ResultStore for PgResultStore {
    async fn insert_event(&self, event: &NewPacketLossEvent) -> Result<(), StoreError> {
        PacketLossEvent::insert(&self.pool, event).await?;
        Ok(())
    }

    async fn insert_events(&self, events: &[NewPacketLossEvent]) -> Result<u64, StoreError> {
        Ok(PacketLossEvent::insert_batch(&self.pool, events).await?)
    }

    async fn upsert_status(&self, update: &DeviceStatusUpdate) -> Result<(), StoreError> {
        DeviceStatusRow::upsert(&self.pool, update).await?;
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    /// In-memory store with a failure switch and a slow batch write
    #[derive(Default)]
    pub struct MemoryStore {
        pub events: Mutex<Vec<NewPacketLossEvent>>,
        pub statuses: Mutex<Vec<DeviceStatusUpdate>>,
        pub batches: Mutex<Vec<usize>>,
        failing: AtomicBool,
        batch_delay_ms: AtomicU64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MemoryStore {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn set_batch_delay(&self, delay: Duration) {
            self.batch_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        }

        /// Most batch writes ever running at once
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store offline".into()));
            }
            Ok(())
        }
    }

    impl ResultStore for MemoryStore {
        async fn insert_event(&self, event: &NewPacketLossEvent) -> Result<(), StoreError> {
            self.check()?;
            self.events.lock().push(event.clone());
            Ok(())
        }

        async fn insert_events(&self, events: &[NewPacketLossEvent]) -> Result<u64, StoreError> {
            self.check()?;
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);

            let delay = self.batch_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.batches.lock().push(events.len());
            self.events.lock().extend_from_slice(events);
            Ok(events.len() as u64)
        }

        async fn upsert_status(&self, update: &DeviceStatusUpdate) -> Result<(), StoreError> {
            self.check()?;
            self.statuses.lock().push(update.clone());
            Ok(())
        }
    }
}
