//! Event fan-out to connected observers.
//!
//! Each event is serialized once and handed to every sink with a
//! non-blocking send. A sink that is full misses the event; a sink that is
//! closed is pruned during the same publish. Publishing holds the sink table
//! for the whole fan-out, so every sink sees events in publish order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use luminafly_core::FleetEvent;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

/// Serialized event frame shared by all sinks
pub type Frame = Arc<str>;

/// Result of handing a frame to one sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sink accepted the frame
    Delivered,
    /// Sink is alive but could not take the frame right now
    Dropped,
    /// Sink is gone and should be pruned
    Closed,
}

/// Destination for serialized event frames.
///
/// Implementations must not block.
pub trait EventSink: Send + Sync {
    /// Offer one frame to the observer
    fn deliver(&self, frame: &Frame) -> Delivery;
}

impl EventSink for mpsc::Sender<Frame> {
    fn deliver(&self, frame: &Frame) -> Delivery {
        match self.try_send(Arc::clone(frame)) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Handle returned by [`EventBroadcaster::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Fan-out publisher owning the set of connected observers
#[derive(Default)]
pub struct EventBroadcaster {
    sinks: Mutex<HashMap<SubscriptionId, Box<dyn EventSink>>>,
    next_id: AtomicU64,
    published: AtomicU64,
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("observers", &self.observer_count())
            .field("published", &self.published_count())
            .finish()
    }
}

impl EventBroadcaster {
    /// Default per-observer buffer for [`subscribe_channel`](Self::subscribe_channel)
    pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

    /// Create a broadcaster with no observers
    pub fn new() -> Self {
        Self::default()
    }

    fn sinks(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Box<dyn EventSink>>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer sink
    pub fn subscribe(&self, sink: impl EventSink + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks().insert(id, Box::new(sink));
        debug!(subscription = %id, "Observer subscribed");
        id
    }

    /// Register a bounded channel observer and greet it with `connected`.
    pub fn subscribe_channel(&self, capacity: usize) -> (SubscriptionId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let greeting = FleetEvent::Connected {
            message: "Connected to LuminaFly fleet feed".to_string(),
        };
        if let Some(frame) = encode(&greeting) {
            let _ = tx.deliver(&frame);
        }
        (self.subscribe(tx), rx)
    }

    /// Remove an observer; returns whether it was connected.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.sinks().remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "Observer unsubscribed");
        }
        removed
    }

    /// Drop every observer
    pub fn disconnect_all(&self) -> usize {
        let mut sinks = self.sinks();
        let count = sinks.len();
        sinks.clear();
        count
    }

    /// Currently connected observers
    pub fn observer_count(&self) -> usize {
        self.sinks().len()
    }

    /// Events published since creation
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every open sink; returns the number that accepted it.
    pub fn publish(&self, event: &FleetEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut sinks = self.sinks();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sink) in sinks.iter() {
            match sink.deliver(&frame) {
                Delivery::Delivered => delivered += 1,
                Delivery::Dropped => trace!(subscription = %id, event = event.kind(), "Observer lagging, event dropped"),
                Delivery::Closed => closed.push(*id),
            }
        }
        for id in closed {
            sinks.remove(&id);
            debug!(subscription = %id, "Pruned closed observer");
        }
        delivered
    }
}

fn encode(event: &FleetEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(event = event.kind(), error = %e, "Failed to serialize event");
            None
        }
    }
}
