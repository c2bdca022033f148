use crate::Event;
use dashmap::DashMap;
use log::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Unique identifier for a bus subscriber (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which transport a subscriber delivers to. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Sse,
    Push,
}

impl fmt::Display for SubscriberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriberKind::Sse => write!(f, "sse"),
            SubscriberKind::Push => write!(f, "push"),
        }
    }
}

/// Outcome of a single [`Bus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that had room for the event
    pub delivered: usize,
    /// Subscribers whose queue was full; the event was dropped for them
    pub dropped: usize,
}

struct Subscriber {
    kind: SubscriberKind,
    sender: mpsc::Sender<Event>,
}

struct Inner {
    subscribers: DashMap<SubscriberId, Subscriber>,
    capacity: usize,
    closed: AtomicBool,
}

/// Fan-out registry: every subscriber gets every event published after it registered.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    /// Creates a bus whose subscriber queues hold at most `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Register a new subscriber. The returned [`Subscription`] deregisters itself on drop.
    pub fn subscribe(&self, kind: SubscriberKind) -> Subscription {
        let id = SubscriberId::new();
        let (sender, receiver) = mpsc::channel(self.inner.capacity);

        if self.is_closed() {
            debug!("Bus closed, {kind} subscriber {id} will receive nothing");
        } else {
            self.inner
                .subscribers
                .insert(id.clone(), Subscriber { kind, sender });

            // A close() racing with the insert above must still end this subscription
            if self.is_closed() {
                self.inner.subscribers.remove(&id);
            } else {
                debug!(
                    "Registered {kind} subscriber {id} ({} active)",
                    self.subscriber_count()
                );
            }
        }

        Subscription {
            id,
            kind,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Offer `event` to every subscriber without waiting on any of them.
    pub fn publish(&self, event: Event) -> PublishReport {
        let mut report = PublishReport::default();
        let mut disconnected = Vec::new();

        for entry in self.inner.subscribers.iter() {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(
                        "Queue full for {} subscriber {}, dropping event {}",
                        entry.kind,
                        entry.key(),
                        event.id()
                    );
                }
                Err(TrySendError::Closed(_)) => disconnected.push(entry.key().clone()),
            }
        }

        for id in disconnected {
            if let Some((_, subscriber)) = self.inner.subscribers.remove(&id) {
                debug!(
                    "Removed disconnected {} subscriber {}",
                    subscriber.kind, id
                );
            }
        }

        debug!(
            "Published event {} ({} bytes): delivered={}, dropped={}",
            event.id(),
            event.len(),
            report.delivered,
            report.dropped
        );

        report
    }

    /// Deregister every subscriber. Their queued events are still drained, after which
    /// `recv` returns `None`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let count = self.subscriber_count();
        self.inner.subscribers.clear();
        info!("Event bus closed, released {count} subscriber(s)");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A subscriber's end of the bus. Events arrive in publish order.
pub struct Subscription {
    id: SubscriberId,
    kind: SubscriberKind,
    receiver: mpsc::Receiver<Event>,
    bus: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn kind(&self) -> SubscriberKind {
        self.kind
    }

    /// Wait for the next event. `None` once the bus is closed and the queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            if inner.subscribers.remove(&self.id).is_some() {
                debug!(
                    "Unregistered {} subscriber {} ({} active)",
                    self.kind,
                    self.id,
                    inner.subscribers.len()
                );
            }
        }
    }
}
