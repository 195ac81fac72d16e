//! Subscriber Registry
//!
//! Owns the set of connected subscribers and fans each message out to all of
//! them. Every subscriber has its own bounded queue drained by its socket
//! task, so a slow subscriber never blocks delivery to the others.
//!
//! # Delivery Policy
//!
//! - Queue closed: the subscriber is gone and is unregistered.
//! - Queue full: this message is dropped for that subscriber only.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::wire::WireMessage;
use crate::infrastructure::metrics;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Serialized message shared by every subscriber queue.
pub type Frame = Arc<str>;

/// Unique identifier for a connected subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers the frame was queued for.
    pub delivered: usize,
    /// Subscribers found closed and removed.
    pub removed: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Currently registered subscribers.
    pub subscribers: usize,
    /// Frames queued since start.
    pub delivered_total: u64,
    /// Deliveries to closed subscribers since start.
    pub failed_total: u64,
    /// Frames dropped for full queues since start.
    pub dropped_total: u64,
}

/// Set of connected subscribers with best-effort fan-out.
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: parking_lot::RwLock<HashMap<SubscriberId, mpsc::Sender<Frame>>>,
    queue_capacity: usize,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl SubscriberRegistry {
    /// Create an empty registry whose queues hold `queue_capacity` frames.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscribers: parking_lot::RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber with a fresh queue.
    ///
    /// The caller drains the returned receiver into the subscriber's socket.
    pub fn register_new(&self) -> (SubscriberId, mpsc::Receiver<Frame>) {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.register(id, tx);
        (id, rx)
    }

    /// Register a subscriber.
    ///
    /// Returns `false` if `id` was already registered; the existing queue is
    /// kept.
    pub fn register(&self, id: SubscriberId, sender: mpsc::Sender<Frame>) -> bool {
        let count = {
            let mut subscribers = self.subscribers.write();
            if subscribers.contains_key(&id) {
                return false;
            }
            subscribers.insert(id, sender);
            subscribers.len()
        };

        metrics::set_subscribers(count);
        tracing::info!(subscriber = %id, subscribers = count, "Subscriber registered");
        true
    }

    /// Remove a subscriber. No-op if absent.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            metrics::set_subscribers(count);
            tracing::info!(subscriber = %id, subscribers = count, "Subscriber unregistered");
        }
        removed
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Serialize `message` once and queue it for every subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized; nothing is sent.
    pub fn broadcast(&self, message: &WireMessage) -> Result<DeliveryReport, serde_json::Error> {
        let frame: Frame = message.to_json()?.into();
        Ok(self.broadcast_frame(&frame))
    }

    /// Queue an already serialized frame for every subscriber.
    ///
    /// Iterates a snapshot of the members taken under a short read lock, so
    /// registration changes during delivery never block or invalidate it.
    pub fn broadcast_frame(&self, frame: &Frame) -> DeliveryReport {
        let members: Vec<(SubscriberId, mpsc::Sender<Frame>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        for (id, tx) in members {
            match tx.try_send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = %id, "Subscriber queue full, dropping message");
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = %id, "Subscriber gone, removing");
                    self.unregister(id);
                    report.removed += 1;
                }
            }
        }

        self.record(report);
        report
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            subscribers: self.len(),
            delivered_total: self.delivered.load(Ordering::Relaxed),
            failed_total: self.failed.load(Ordering::Relaxed),
            dropped_total: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: DeliveryReport) {
        let delivered = report.delivered as u64;
        let removed = report.removed as u64;
        let dropped = report.dropped as u64;

        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.failed.fetch_add(removed, Ordering::Relaxed);
        self.dropped.fetch_add(dropped, Ordering::Relaxed);

        metrics::record_delivered(delivered);
        if removed > 0 {
            metrics::record_delivery_failed(removed);
        }
        if dropped > 0 {
            metrics::record_slow_drops(dropped);
        }
    }
}

/// Shared registry reference.
pub type SharedRegistry = Arc<SubscriberRegistry>;
