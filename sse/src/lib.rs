//! Server-Sent Events (SSE) publisher.
//!
//! Every SSE client gets its own subscription on the event bus. Each event it
//! receives is encrypted, base64url encoded and written as a `data:` frame.
//!
//! # Message Flow
//!
//! 1. Client opens `GET /sse`
//! 2. The handler calls [`Manager::connect`], which registers a bus subscription
//!    before the response is returned, so no event published after the request
//!    arrived is missed
//! 3. The webhook controller publishes an event on the bus
//! 4. [`Connection::into_stream`] encrypts it and yields `data: <payload>\n\n`
//! 5. When the client disconnects axum drops the stream, the subscription is
//!    dropped with it and the bus forgets the connection
//!
//! # Modules
//!
//! - `connection`: one client's subscription and frame stream
//! - `manager`: opens connections against the shared bus and cipher

pub mod connection;
pub mod manager;

pub use connection::Connection;
pub use manager::Manager;
