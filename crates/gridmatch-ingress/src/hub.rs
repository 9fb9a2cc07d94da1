//! Fan-out of feed events to live subscribers.
//!
//! Each subscriber owns a bounded queue. [`BroadcastHub::publish`]
//! serializes the event once and `try_send`s it to every queue, so the
//! caller (the matching engine under its market lock, or the settlement
//! coordinator) never waits on subscriber I/O. A subscriber whose queue is
//! full or closed is removed on that publish and gets nothing further.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gridmatch_types::{BroadcastConfig, EventPublisher, FeedEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

/// A live feed connection. Messages are JSON-encoded [`FeedEvent`]s.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message; `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Arc<str>>>>,
    next_id: AtomicU64,
    queue: usize,
}

impl BroadcastHub {
    #[must_use]
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue: config.subscriber_queue.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, tx);
        debug!(subscriber = id, "Subscriber connected");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(subscriber = id, "Subscriber disconnected");
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl EventPublisher for BroadcastHub {
    fn publish(&self, event: &FeedEvent) {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(error = %e, "Failed to serialize feed event");
                return;
            }
        };
        self.subscribers
            .lock()
            .retain(|id, tx| match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = *id, "Dropping slow subscriber");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }
}
