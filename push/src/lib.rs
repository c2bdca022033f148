//! Push publisher: delivers relayed events to clients of a SignalR-compatible hub.
//!
//! Clients negotiate on `/signalr/negotiate`, open a WebSocket on `/signalr`, complete
//! the JSON hub protocol handshake and then receive every event as an invocation of
//! `ReceiveMessage(payload)`, where `payload` is the base64url encoded encrypted frame.
//!
//! # Modules
//!
//! - `protocol`: wire format of the JSON hub protocol and the negotiate response
//! - `clients`: registry of connected clients with per-client outbound queues
//! - `hub`: lifecycle callbacks (connect, disconnect, initialize)
//! - `session`: one client's WebSocket session
//! - `publisher`: background task fanning bus events out to every client

pub mod clients;
pub mod hub;
pub mod protocol;
pub mod publisher;
pub mod session;

pub use clients::{ConnectionId, HubClients};
pub use hub::{Hub, RelayHub};
pub use publisher::{Publisher, RECEIVE_MESSAGE};
pub use session::SessionOptions;
