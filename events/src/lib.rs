//! In-process event fan-out for the relay.
//!
//! An [`Event`] is the text capture of one inbound webhook request. It is published
//! once onto the [`Bus`] and every registered subscriber (one per SSE connection plus
//! the push publisher) receives its own copy through a bounded queue.
//!
//! # Architecture
//!
//! - **Registry, not a shared queue**: each subscriber registers its own queue, so a
//!   transport can never steal events from another one.
//! - **Non-blocking publish**: the webhook handler never waits on a subscriber.
//! - **Drop-newest backpressure**: when a subscriber's queue is full the new event is
//!   dropped for that subscriber only and a warning is logged.
//! - **RAII deregistration**: dropping a [`Subscription`] removes it from the registry,
//!   which is how a closed SSE connection stops receiving.

use std::fmt;
use std::sync::Arc;

pub mod bus;

pub use bus::{Bus, PublishReport, SubscriberId, SubscriberKind, Subscription};

/// Identifier used to correlate one event across log lines of every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(uuid::Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One captured webhook request. Immutable; clones share the same text.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    text: Arc<str>,
}

impl Event {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self {
            id: EventId::new(),
            text: text.into(),
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
