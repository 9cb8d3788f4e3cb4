//! Bounded worker pool for prediction completions
//!
//! Jobs are boxed futures returning an explicit `Result`. Each job runs in its
//! own task so a panic is caught at the join point; `Err` values and panics
//! are logged and counted, and the worker moves on to the next job.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::fanout::FanoutError;

pub type CallbackJob = Pin<Box<dyn Future<Output = Result<(), CallbackError>> + Send + 'static>>;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("callback pool is closed")]
    Closed,
}

/// Submission side of the pool
#[derive(Clone)]
pub struct CallbackHandle {
    tx: mpsc::Sender<CallbackJob>,
}

impl CallbackHandle {
    /// Waits for queue space; fails once the pool has stopped
    pub async fn submit(&self, job: CallbackJob) -> Result<(), SubmitError> {
        self.tx.send(job).await.map_err(|_| SubmitError::Closed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

pub struct CallbackPool {
    handle: CallbackHandle,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    cancel: watch::Sender<bool>,
}

impl CallbackPool {
    pub fn spawn(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let (cancel, cancel_rx) = watch::channel(false);

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&counters),
                    cancel_rx.clone(),
                ))
            })
            .collect();

        Self {
            handle: CallbackHandle { tx },
            workers,
            counters,
            cancel,
        }
    }

    pub fn handle(&self) -> CallbackHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and let workers drain it.
    ///
    /// Workers only see the queue closed once every [`CallbackHandle`] is
    /// dropped. Jobs still running after `grace` are aborted and joined, so
    /// none of them outlives this call.
    pub async fn shutdown(self, grace: Duration) -> PoolStats {
        let Self {
            handle,
            mut workers,
            counters,
            cancel,
        } = self;
        drop(handle);

        let drained = tokio::time::timeout(grace, async {
            for worker in workers.iter_mut() {
                let _ = worker.await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "callback workers still busy, aborting");
            let _ = cancel.send(true);
            // joined handles must not be polled again
            workers.retain(|worker| !worker.is_finished());
            for worker in workers {
                let _ = worker.await;
            }
        }

        let stats = PoolStats {
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            panicked: counters.panicked.load(Ordering::Relaxed),
        };
        tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            panicked = stats.panicked,
            "callback pool stopped"
        );
        stats
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<CallbackJob>>>,
    counters: Arc<Counters>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let job = tokio::select! {
            job = async { rx.lock().await.recv().await } => job,
            _ = cancelled(&mut cancel) => break,
        };
        let Some(job) = job else { break };

        let mut task = tokio::spawn(job);
        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = cancelled(&mut cancel) => {
                task.abort();
                let _ = task.await;
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = id, "prediction callback aborted");
                break;
            }
        };

        match joined {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker = id, error = %e, "prediction callback failed");
            }
            Err(e) if e.is_panic() => {
                counters.panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker = id, "prediction callback panicked");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = id, error = %e, "prediction callback cancelled");
            }
        }
    }

    tracing::debug!(worker = id, "callback worker stopped");
}

/// Resolves once shutdown asks workers to stop; never if the pool was dropped
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let stopped = cancel.wait_for(|stop| *stop).await.is_ok();
    if !stopped {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use tokio::sync::oneshot;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    async fn explode() -> Result<(), CallbackError> {
        panic!("callback blew up")
    }

    #[tokio::test]
    async fn test_error_and_panic_do_not_stop_later_jobs() {
        let pool = CallbackPool::spawn(1, 8);
        let handle = pool.handle();
        let ran = Arc::new(AtomicUsize::new(0));

        handle
            .submit(Box::pin(async { Err(CallbackError::Other("boom".into())) }))
            .await
            .unwrap();
        handle
            .submit(Box::pin(explode()))
            .await
            .unwrap();
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            handle
                .submit(Box::pin(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .await
                .unwrap();
        }
        drop(handle);

        let stats = pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(
            stats,
            PoolStats {
                completed: 3,
                failed: 1,
                panicked: 1
            }
        );
    }

    #[tokio::test]
    async fn test_jobs_spread_over_workers() {
        let pool = CallbackPool::spawn(4, 16);
        let handle = pool.handle();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let ran = Arc::clone(&ran);
            handle
                .submit(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .await
                .unwrap();
        }
        drop(handle);

        let stats = pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 20);
        assert_eq!(stats.completed, 20);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_after_grace() {
        let pool = CallbackPool::spawn(2, 4);
        // outstanding handle keeps the queue open
        let handle = pool.handle();

        pool.shutdown(Duration::from_millis(50)).await;

        let rejected = handle.submit(Box::pin(async { Ok(()) })).await;
        assert_eq!(rejected, Err(SubmitError::Closed));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_job() {
        let pool = CallbackPool::spawn(1, 4);
        let handle = pool.handle();
        let dropped = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = oneshot::channel();

        let guard = SetOnDrop(Arc::clone(&dropped));
        let done = Arc::clone(&finished);
        handle
            .submit(Box::pin(async move {
                let _guard = guard;
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_secs(3600)).await;
                done.store(true, Ordering::SeqCst);
                Ok(())
            }))
            .await
            .unwrap();
        started_rx.await.unwrap();

        let stats = pool.shutdown(Duration::from_millis(50)).await;

        assert!(dropped.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }
}
