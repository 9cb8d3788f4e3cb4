//! Broadcast hub for connected observers
//!
//! Each observer owns a bounded queue. Delivery is `try_send` per observer, so
//! one slow or dead observer never holds up the rest.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

pub struct BroadcastHub {
    observers: DashMap<Uuid, mpsc::Sender<Arc<str>>>,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.observers.insert(id, tx);
        tracing::info!(observer = %id, total = self.observers.len(), "observer connected");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            tracing::info!(observer = %id, total = self.observers.len(), "observer disconnected");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Push to every observer; returns how many accepted the message
    pub fn publish(&self, message: Arc<str>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for observer in self.observers.iter() {
            match observer.value().try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(observer = %observer.key(), "observer queue full, alert skipped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*observer.key()),
            }
        }

        // removal happens after iteration releases the shard locks
        for id in closed {
            self.observers.remove(&id);
            tracing::debug!(observer = %id, "dropped closed observer");
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_observers_receive() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.publish(Arc::from("alert")), 2);
        assert_eq!(&*a.receiver.recv().await.unwrap(), "alert");
        assert_eq!(&*b.receiver.recv().await.unwrap(), "alert");
    }

    #[tokio::test]
    async fn test_closed_observer_is_dropped_others_unaffected() {
        let hub = BroadcastHub::new(8);
        let dead = hub.subscribe();
        let mut alive = hub.subscribe();
        drop(dead.receiver);

        assert_eq!(hub.publish(Arc::from("first")), 1);
        assert_eq!(hub.observer_count(), 1);
        assert_eq!(&*alive.receiver.recv().await.unwrap(), "first");

        assert_eq!(hub.publish(Arc::from("second")), 1);
        assert_eq!(&*alive.receiver.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_full_observer_stays_subscribed() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe();

        assert_eq!(hub.publish(Arc::from("one")), 1);
        assert_eq!(hub.publish(Arc::from("two")), 0);
        assert_eq!(hub.observer_count(), 1);

        assert_eq!(&*slow.receiver.recv().await.unwrap(), "one");
        assert_eq!(hub.publish(Arc::from("three")), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = BroadcastHub::new(4);
        let sub = hub.subscribe();
        assert!(hub.unsubscribe(sub.id));
        assert!(!hub.unsubscribe(sub.id));
        assert_eq!(hub.publish(Arc::from("nobody")), 0);
    }
}
