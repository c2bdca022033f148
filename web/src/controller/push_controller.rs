//! Controller for the push hub: negotiation and the WebSocket transport.

use crate::AppState;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use push::session;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Connection token handed out by negotiate
    pub id: Option<String>,
}

/// POST negotiate a hub connection. Only the WebSockets transport is offered.
pub async fn negotiate(State(app_state): State<AppState>) -> impl IntoResponse {
    let response = app_state.hub_clients.negotiate();
    debug!("Negotiated hub connection {}", response.connection_id);
    Json(response)
}

/// GET upgrade to the WebSocket transport and run the hub session on it.
pub async fn connect(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    let connection_id = app_state.hub_clients.claim(params.id.as_deref());
    debug!("Upgrading hub connection {connection_id} to WebSocket");

    let hub = Arc::clone(&app_state.hub);
    let clients = Arc::clone(&app_state.hub_clients);
    let options = app_state.session_options();

    ws.on_upgrade(move |socket| session::run(socket, connection_id, hub, clients, options))
}
