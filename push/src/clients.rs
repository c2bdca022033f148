use crate::protocol::{AvailableTransport, HubMessage, NegotiateResponse, NEGOTIATE_VERSION};
use dashmap::DashMap;
use log::*;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};

/// How long a negotiated connection token stays valid without a WebSocket connecting with it.
const PENDING_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Unique identifier for a hub connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct PendingConnection {
    connection_id: ConnectionId,
    negotiated_at: Instant,
}

/// Registry of connected hub clients, each with a bounded queue of outbound frames.
pub struct HubClients {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    /// Connection tokens handed out by negotiate, keyed by token
    pending: DashMap<String, PendingConnection>,
    capacity: usize,
}

impl HubClients {
    pub fn new(capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            pending: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Reserve a connection id for a client about to open the WebSocket transport.
    pub fn negotiate(&self) -> NegotiateResponse {
        self.pending
            .retain(|_, pending| pending.negotiated_at.elapsed() < PENDING_TOKEN_TTL);

        let connection_id = ConnectionId::new();
        let connection_token = uuid::Uuid::new_v4().to_string();
        self.pending.insert(
            connection_token.clone(),
            PendingConnection {
                connection_id: connection_id.clone(),
                negotiated_at: Instant::now(),
            },
        );
        debug!("Negotiated hub connection {connection_id}");

        NegotiateResponse {
            negotiate_version: NEGOTIATE_VERSION,
            connection_id: connection_id.as_str().to_string(),
            connection_token,
            available_transports: vec![AvailableTransport::websockets()],
        }
    }

    /// Resolve the `id` query parameter of a WebSocket request to a connection id.
    ///
    /// Clients that skip negotiation, or present an unknown or expired token, get a fresh id.
    pub fn claim(&self, token: Option<&str>) -> ConnectionId {
        token
            .and_then(|token| self.pending.remove(token))
            .filter(|(_, pending)| pending.negotiated_at.elapsed() < PENDING_TOKEN_TTL)
            .map(|(_, pending)| pending.connection_id)
            .unwrap_or_default()
    }

    /// Register a connection and return the receiving end of its outbound queue.
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::Receiver<String> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.connections.insert(connection_id.clone(), sender);
        info!(
            "Registered hub connection {connection_id} ({} connected)",
            self.len()
        );
        receiver
    }

    pub fn unregister(&self, connection_id: &ConnectionId) {
        if self.connections.remove(connection_id).is_some() {
            info!(
                "Unregistered hub connection {connection_id} ({} connected)",
                self.len()
            );
        }
    }

    /// Queue `message` for one connection. Returns whether it was queued.
    pub fn send_to(&self, connection_id: &ConnectionId, message: &HubMessage) -> bool {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize hub message: {e}");
                return false;
            }
        };

        match self.connections.get(connection_id) {
            Some(sender) => Self::offer(connection_id, &sender, frame),
            None => false,
        }
    }

    /// Invoke `target` on every connected client. Returns how many clients it was queued for.
    pub fn send_all(&self, target: &str, arguments: Vec<Value>) -> usize {
        let frame = match HubMessage::invocation(target, arguments).to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {target} invocation: {e}");
                return 0;
            }
        };

        self.connections
            .iter()
            .filter(|entry| Self::offer(entry.key(), entry.value(), frame.clone()))
            .count()
    }

    /// Send a close message to every client and forget them. Their sessions end once the
    /// close message has been flushed.
    pub fn close_all(&self) {
        let close = HubMessage::Close {
            error: None,
            allow_reconnect: false,
        };
        if let Ok(frame) = close.to_frame() {
            for entry in self.connections.iter() {
                Self::offer(entry.key(), entry.value(), frame.clone());
            }
        }
        let count = self.len();
        self.connections.clear();
        info!("Closed {count} hub connection(s)");
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn offer(connection_id: &ConnectionId, sender: &mpsc::Sender<String>, frame: String) -> bool {
        match sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for hub connection {connection_id}, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Hub connection {connection_id} is closing, message not sent");
                false
            }
        }
    }
}

impl Default for HubClients {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RECORD_SEPARATOR;
    use serde_json::json;

    fn parse(frame: &str) -> HubMessage {
        HubMessage::parse(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap()
    }

    #[tokio::test]
    async fn test_send_all_reaches_every_client() {
        let clients = HubClients::new(4);
        let mut first = clients.register(ConnectionId::new());
        let mut second = clients.register(ConnectionId::new());

        let reached = clients.send_all("ReceiveMessage", vec![json!("payload")]);
        assert_eq!(reached, 2);

        for receiver in [&mut first, &mut second] {
            let frame = receiver.recv().await.unwrap();
            assert_eq!(
                parse(&frame),
                HubMessage::invocation("ReceiveMessage", vec![json!("payload")])
            );
        }
    }

    #[tokio::test]
    async fn test_send_all_without_clients() {
        let clients = HubClients::default();
        assert!(clients.is_empty());
        assert_eq!(clients.send_all("ReceiveMessage", vec![]), 0);
    }

    #[tokio::test]
    async fn test_unregistered_client_is_skipped() {
        let clients = HubClients::new(4);
        let id = ConnectionId::new();
        let _receiver = clients.register(id.clone());

        clients.unregister(&id);
        assert_eq!(clients.len(), 0);
        assert_eq!(clients.send_all("ReceiveMessage", vec![]), 0);
        assert!(!clients.send_to(&id, &HubMessage::Ping));
    }

    #[tokio::test]
    async fn test_full_queue_drops_message_for_that_client_only() {
        let clients = HubClients::new(1);
        let _stalled = clients.register(ConnectionId::new());
        let mut healthy = clients.register(ConnectionId::new());

        assert_eq!(clients.send_all("ReceiveMessage", vec![json!("1")]), 2);
        healthy.recv().await.unwrap();

        assert_eq!(clients.send_all("ReceiveMessage", vec![json!("2")]), 1);
        assert!(healthy.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_negotiated_token_is_claimed_once() {
        let clients = HubClients::default();
        let response = clients.negotiate();

        let claimed = clients.claim(Some(response.connection_token.as_str()));
        assert_eq!(claimed.as_str(), response.connection_id);

        let second = clients.claim(Some(response.connection_token.as_str()));
        assert_ne!(second.as_str(), response.connection_id);
    }

    #[tokio::test]
    async fn test_claim_without_token_creates_new_id() {
        let clients = HubClients::default();
        assert_ne!(clients.claim(None), clients.claim(Some("unknown")));
    }

    #[tokio::test]
    async fn test_close_all_sends_close_and_forgets_clients() {
        let clients = HubClients::new(4);
        let mut receiver = clients.register(ConnectionId::new());

        clients.close_all();

        assert!(clients.is_empty());
        assert!(matches!(
            parse(&receiver.recv().await.unwrap()),
            HubMessage::Close { .. }
        ));
        assert!(receiver.recv().await.is_none());
    }
}
