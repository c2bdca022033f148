//! One hub client's WebSocket session: handshake, keep-alive and message pumping.

use crate::clients::{ConnectionId, HubClients};
use crate::hub::Hub;
use crate::protocol::{split_frames, HandshakeRequest, HandshakeResponse, HubMessage};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Interval between server pings
    pub keep_alive: Duration,
    /// Time the client has to send its handshake
    pub handshake_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}

enum Handshake {
    Accepted { pending_frames: Vec<String> },
    Rejected(String),
    Disconnected,
}

/// Drive a hub session until the client leaves, the socket fails, or the hub shuts down.
pub async fn run(
    socket: WebSocket,
    connection_id: ConnectionId,
    hub: Arc<dyn Hub>,
    clients: Arc<HubClients>,
    options: SessionOptions,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let pending_frames = match timeout(options.handshake_timeout, read_handshake(&mut ws_receiver))
        .await
    {
        Ok(Handshake::Accepted { pending_frames }) => pending_frames,
        Ok(Handshake::Rejected(reason)) => {
            warn!("Hub handshake for {connection_id} rejected: {reason}");
            reply_handshake(&mut ws_sender, HandshakeResponse::error(reason)).await;
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
        Ok(Handshake::Disconnected) => {
            debug!("{connection_id} left before completing the hub handshake");
            return;
        }
        Err(_) => {
            warn!(
                "{connection_id} did not complete the hub handshake within {:?}",
                options.handshake_timeout
            );
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    // Register first: invocations queued now are written only after the handshake reply
    let outbound = clients.register(connection_id.clone());
    if !reply_handshake(&mut ws_sender, HandshakeResponse::ok()).await {
        clients.unregister(&connection_id);
        return;
    }
    hub.on_connected(&connection_id);

    let mut client_closed = false;
    for frame in &pending_frames {
        client_closed |= handle_client_frame(frame, &connection_id, &clients);
    }

    if !client_closed {
        let mut send_task = tokio::spawn(send_loop(
            ws_sender,
            outbound,
            options.keep_alive,
            connection_id.clone(),
        ));
        let mut recv_task = tokio::spawn(recv_loop(
            ws_receiver,
            connection_id.clone(),
            Arc::clone(&clients),
        ));

        // Wait for either side to finish, then stop the other
        tokio::select! {
            _ = &mut send_task => {
                trace!("Send task for {connection_id} completed");
                recv_task.abort();
            }
            _ = &mut recv_task => {
                trace!("Receive task for {connection_id} completed");
                send_task.abort();
            }
        }
    }

    clients.unregister(&connection_id);
    hub.on_disconnected(&connection_id);
}

/// Read until the first complete hub message, which must be the handshake request.
async fn read_handshake(receiver: &mut SplitStream<WebSocket>) -> Handshake {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let mut frames = split_frames(&text);
                let Some(first) = frames.next() else {
                    continue;
                };
                return match HandshakeRequest::parse(first) {
                    Ok(request) => {
                        trace!(
                            "Hub handshake: protocol={}, version={}",
                            request.protocol,
                            request.version
                        );
                        Handshake::Accepted {
                            pending_frames: frames.map(str::to_string).collect(),
                        }
                    }
                    Err(e) => Handshake::Rejected(e.to_string()),
                };
            }
            Ok(Message::Binary(_)) => {
                return Handshake::Rejected("binary transfer format is not supported".to_string())
            }
            Ok(Message::Close(_)) | Err(_) => return Handshake::Disconnected,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
        }
    }
    Handshake::Disconnected
}

async fn reply_handshake(
    sender: &mut SplitSink<WebSocket, Message>,
    response: HandshakeResponse,
) -> bool {
    let frame = match response.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to serialize handshake response: {e}");
            return false;
        }
    };
    sender.send(Message::Text(frame)).await.is_ok()
}

/// Forward queued frames to the socket and ping the client while idle.
async fn send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: tokio::sync::mpsc::Receiver<String>,
    keep_alive: Duration,
    connection_id: ConnectionId,
) {
    let ping = match HubMessage::Ping.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            error!("Failed to serialize ping message: {e}");
            return;
        }
    };

    let mut ticker = interval_at(Instant::now() + keep_alive, keep_alive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => {
                    // Unregistered by the hub (shutdown): the close message was already sent
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => ping.clone(),
        };

        if let Err(e) = sender.send(Message::Text(frame)).await {
            debug!("Failed to write to hub connection {connection_id}: {e}");
            break;
        }
        ticker.reset();
    }
}

/// Handle client messages until it closes the session.
async fn recv_loop(
    mut receiver: SplitStream<WebSocket>,
    connection_id: ConnectionId,
    clients: Arc<HubClients>,
) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let mut closed = false;
                for frame in split_frames(&text) {
                    closed |= handle_client_frame(frame, &connection_id, &clients);
                }
                if closed {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary message from hub connection {connection_id}");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                debug!("{connection_id} initiated close: {frame:?}");
                break;
            }
            Err(e) => {
                debug!("WebSocket error on hub connection {connection_id}: {e}");
                break;
            }
        }
    }
}

/// Returns `true` when the client asked to close the session.
fn handle_client_frame(frame: &str, connection_id: &ConnectionId, clients: &HubClients) -> bool {
    match HubMessage::parse(frame) {
        Ok(HubMessage::Ping) => {
            trace!("Ping from {connection_id}");
            false
        }
        Ok(HubMessage::Close { error, .. }) => {
            debug!("{connection_id} sent close (error: {error:?})");
            true
        }
        Ok(HubMessage::Invocation {
            invocation_id,
            target,
            ..
        }) => {
            warn!("{connection_id} invoked unknown hub method '{target}'");
            if let Some(invocation_id) = invocation_id {
                clients.send_to(
                    connection_id,
                    &HubMessage::Completion {
                        invocation_id,
                        error: Some(format!("Unknown hub method '{target}'")),
                    },
                );
            }
            false
        }
        Ok(other) => {
            trace!("Ignoring hub message {other:?} from {connection_id}");
            false
        }
        Err(e) => {
            warn!("Malformed message from hub connection {connection_id}: {e}");
            false
        }
    }
}
