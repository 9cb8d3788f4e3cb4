//! Anomaly persistence, direct or buffered

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::store::{ResultStore, StoreError};
use crate::models::{NewPacketLossEvent, PredictionResult};

/// Accumulates events and writes them in batches
pub struct BufferedWriter<S> {
    store: Arc<S>,
    buffer: parking_lot::Mutex<Vec<NewPacketLossEvent>>,
    // serializes flushes so the periodic and final flush never interleave
    flush_gate: tokio::sync::Mutex<()>,
}

impl<S: ResultStore> BufferedWriter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            buffer: parking_lot::Mutex::new(Vec::new()),
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn enqueue(&self, event: NewPacketLossEvent) {
        self.buffer.lock().push(event);
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drain the buffer and write it in one batch.
    ///
    /// The buffer is emptied before the write; rows of a failed write are
    /// dropped and the loss is logged.
    pub async fn flush(&self) -> Result<u64, StoreError> {
        let _gate = self.flush_gate.lock().await;

        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        match self.store.insert_events(&batch).await {
            Ok(written) => {
                tracing::debug!(rows = written, "flushed packet loss events");
                Ok(written)
            }
            Err(e) => {
                tracing::error!(lost = batch.len(), error = %e, "batch write failed, events dropped");
                Err(e)
            }
        }
    }

    /// Flush every `interval` until shutdown, then flush once more
    pub fn spawn_flush_task(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = self.flush().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!(pending = self.pending(), "final flush");
            let _ = self.flush().await;
        })
    }
}

pub enum Persistence<S> {
    Direct(Arc<S>),
    Buffered(Arc<BufferedWriter<S>>),
}

impl<S> Clone for Persistence<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Direct(store) => Self::Direct(Arc::clone(store)),
            Self::Buffered(writer) => Self::Buffered(Arc::clone(writer)),
        }
    }
}

impl<S: ResultStore> Persistence<S> {
    pub async fn persist(&self, result: &PredictionResult) -> Result<(), StoreError> {
        let event = NewPacketLossEvent::from(result);
        match self {
            Self::Direct(store) => store.insert_event(&event).await,
            Self::Buffered(writer) => {
                writer.enqueue(event);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::store::testing::MemoryStore;

    fn event(device: &str, ts: i64) -> NewPacketLossEvent {
        NewPacketLossEvent {
            device_id: device.into(),
            event_timestamp: ts,
            has_packet_loss: true,
        }
    }

    #[tokio::test]
    async fn test_flush_writes_one_batch() {
        let store = Arc::new(MemoryStore::default());
        let writer = BufferedWriter::new(store.clone());

        writer.enqueue(event("a", 1));
        writer.enqueue(event("b", 2));
        writer.enqueue(event("a", 3));

        assert_eq!(writer.flush().await.unwrap(), 3);
        assert_eq!(writer.pending(), 0);
        assert_eq!(*store.batches.lock(), vec![3]);
        assert_eq!(store.events.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_flush_skips_store() {
        let store = Arc::new(MemoryStore::default());
        let writer = BufferedWriter::new(store.clone());

        assert_eq!(writer.flush().await.unwrap(), 0);
        assert!(store.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch() {
        let store = Arc::new(MemoryStore::default());
        let writer = BufferedWriter::new(store.clone());

        writer.enqueue(event("a", 1));
        store.set_failing(true);
        assert!(writer.flush().await.is_err());
        assert_eq!(writer.pending(), 0);

        store.set_failing(false);
        writer.enqueue(event("a", 2));
        assert_eq!(writer.flush().await.unwrap(), 1);
        assert_eq!(store.events.lock()[0].event_timestamp, 2);
    }

    #[tokio::test]
    async fn test_concurrent_flushes_are_serialized() {
        let store = Arc::new(MemoryStore::default());
        store.set_batch_delay(Duration::from_millis(20));
        let writer = BufferedWriter::new(store.clone());

        writer.enqueue(event("a", 1));
        writer.enqueue(event("a", 2));

        let (first, second) = tokio::join!(writer.flush(), async {
            writer.enqueue(event("b", 3));
            writer.flush().await
        });

        assert_eq!(first.unwrap() + second.unwrap(), 3);
        assert_eq!(store.max_in_flight(), 1);
        assert_eq!(writer.pending(), 0);

        let mut written: Vec<i64> = store.events.lock().iter().map(|e| e.event_timestamp).collect();
        written.sort_unstable();
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_shutdown_runs_final_flush() {
        let store = Arc::new(MemoryStore::default());
        let writer = Arc::new(BufferedWriter::new(store.clone()));
        let (tx, rx) = watch::channel(false);

        let handle = Arc::clone(&writer).spawn_flush_task(Duration::from_secs(3600), rx);
        writer.enqueue(event("a", 1));
        writer.enqueue(event("a", 2));

        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(store.events.lock().len(), 2);
        assert_eq!(writer.pending(), 0);
    }

    #[tokio::test]
    async fn test_direct_mode_writes_immediately() {
        let store = Arc::new(MemoryStore::default());
        let persistence = Persistence::Direct(store.clone());

        persistence.persist(&PredictionResult::new("d1", true)).await.unwrap();

        let events = store.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device_id, "d1");
        assert!(events[0].has_packet_loss);
    }
}
