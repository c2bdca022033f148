use crate::clients::{ConnectionId, HubClients};
use log::*;

/// Lifecycle callbacks of the push hub.
///
/// Implementations only observe; connection state itself lives in [`HubClients`].
pub trait Hub: Send + Sync {
    /// Called once when the hub is mounted, before any client connects.
    fn initialize(&self, _clients: &HubClients) {}

    /// Called after a client completed the handshake.
    fn on_connected(&self, _connection_id: &ConnectionId) {}

    /// Called after a client's session ended, for whatever reason.
    fn on_disconnected(&self, _connection_id: &ConnectionId) {}
}

/// The relay's hub: clients only listen for `ReceiveMessage`, so all it does is log.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayHub;

impl Hub for RelayHub {
    fn initialize(&self, clients: &HubClients) {
        info!("Push hub initialized ({} connected)", clients.len());
    }

    fn on_connected(&self, connection_id: &ConnectionId) {
        info!("{connection_id} connected");
    }

    fn on_disconnected(&self, connection_id: &ConnectionId) {
        info!("{connection_id} disconnected");
    }
}
