//! Events fanned out to connected subscribers, and the events the ledger
//! emits towards the settlement coordinator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Match, SortedResult, SortingRequest};

/// An event delivered to live subscribers. No history is replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedEvent {
    Match(Match),
    SortedResult(SortedResult),
}

/// Fan-out seam between producers (engine, coordinator) and the
/// subscriber hub.
///
/// `publish` must never block the caller on subscriber I/O.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &FeedEvent);
}

/// Publisher that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: &FeedEvent) {}
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, event: &FeedEvent) {
        (**self).publish(event);
    }
}

/// Events surfaced by the ledger's subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A group needs its buyers or sellers ordered for a round.
    SortingNeeded(SortingRequest),
    /// The on-chain hour moved forward.
    RoundAdvanced { round: u64 },
}

/// Publisher that records everything, for tests.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: std::sync::Mutex<Vec<FeedEvent>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl RecordingPublisher {
    pub fn events(&self) -> Vec<FeedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &FeedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
