use crate::clients::HubClients;
use domain::Cipher;
use events::{Bus, Event, SubscriberKind, Subscription};
use log::*;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Client method every relayed event is delivered to.
pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";

/// Background loop relaying every bus event to all connected hub clients.
pub struct Publisher {
    subscription: Subscription,
    cipher: Arc<Cipher>,
    clients: Arc<HubClients>,
}

impl Publisher {
    /// Subscribes immediately, so events published before [`Publisher::spawn`] runs are kept.
    pub fn new(bus: &Bus, cipher: Arc<Cipher>, clients: Arc<HubClients>) -> Self {
        Self {
            subscription: bus.subscribe(SubscriberKind::Push),
            cipher,
            clients,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Relay events until the bus is closed.
    pub async fn run(mut self) {
        info!("Push publisher started");
        while let Some(event) = self.subscription.recv().await {
            self.relay(&event);
        }
        info!("Push publisher stopped");
    }

    /// Encrypt one event and invoke `ReceiveMessage` on every client. Returns the number of
    /// clients reached, or `None` when the event could not be encrypted.
    fn relay(&self, event: &Event) -> Option<usize> {
        let payload = match self.cipher.encrypt_encoded(event.as_bytes()) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encrypt event {} for push clients: {e}", event.id());
                return None;
            }
        };

        let reached = self
            .clients
            .send_all(RECEIVE_MESSAGE, vec![Value::String(payload)]);
        info!(
            "Message {} relayed to {reached} push client(s)",
            event.id()
        );
        Some(reached)
    }
}
