//! Subscriber registry: fans each published snapshot out to observers.
//!
//! Every subscriber owns a bounded `mpsc` channel. Publishing uses
//! `try_send`, so a slow subscriber never stalls the polling loop: when its
//! buffer is full that one notification is dropped for that subscriber.
//! Subscribers whose receiver has been dropped are pruned on publish.
//!
//! The subscriber map is the only state touched from both the publish path
//! and the subscribe/unsubscribe path. It sits behind a `std::sync::Mutex`
//! that is never held across an await.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, warn};

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Inner<T> {
    subscribers: BTreeMap<SubscriptionId, mpsc::Sender<T>>,
    /// Last published value, kept only when replay is enabled.
    last: Option<T>,
    next_id: u64,
    dropped: u64,
}

/// The set of observers for one supervisor.
pub struct SubscriberRegistry<T> {
    inner: Arc<Mutex<Inner<T>>>,
    buffer: usize,
    replay_last: bool,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            buffer: self.buffer,
            replay_last: self.replay_last,
        }
    }
}

impl<T: Clone + Send + 'static> SubscriberRegistry<T> {
    /// Create a registry whose subscribers buffer up to `buffer` snapshots.
    ///
    /// With `replay_last`, a new subscriber immediately receives the most
    /// recently published snapshot.
    pub fn new(buffer: usize, replay_last: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                subscribers: BTreeMap::new(),
                last: None,
                next_id: 0,
                dropped: 0,
            })),
            buffer: buffer.max(1),
            replay_last,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut inner = self.lock();

        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;

        if let Some(last) = inner.last.clone() {
            // Fresh channel with capacity >= 1, cannot be full.
            let _ = tx.try_send(last);
        }
        inner.subscribers.insert(id, tx);
        debug!(subscription = %id, subscribers = inner.subscribers.len(), "subscribed");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Stop all future deliveries to `id`. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            debug!(subscription = %id, "unsubscribed");
        }
        removed
    }

    /// Deliver `value` to every current subscriber.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn publish(&self, value: T) -> usize {
        let mut inner = self.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();
        let mut full = 0u64;

        for (id, tx) in &inner.subscribers {
            match tx.try_send(value.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    full += 1;
                    warn!(subscription = %id, "subscriber is lagging, dropping notification");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            inner.subscribers.remove(&id);
            debug!(subscription = %id, "pruned closed subscriber");
        }
        inner.dropped += full;
        if self.replay_last {
            inner.last = Some(value);
        }

        delivered
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifications dropped because a subscriber's buffer was full.
    pub fn dropped_notifications(&self) -> u64 {
        self.lock().dropped
    }
}

/// Receiving end of a subscription.
///
/// Dropping it unsubscribes.
pub struct Subscription<T> {
    id: SubscriptionId,
    rx: mpsc::Receiver<T>,
    registry: Weak<Mutex<Inner<T>>>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next snapshot. `None` once unsubscribed and drained, or
    /// once the supervisor is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .remove(&self.id);
        }
    }
}
