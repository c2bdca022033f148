use async_stream::stream;
use axum::response::sse::Event as SseEvent;
use domain::Cipher;
use events::{SubscriberId, Subscription};
use futures_util::Stream;
use log::*;
use std::convert::Infallible;
use std::sync::Arc;

/// One SSE client: its bus subscription plus the cipher used to seal what it receives.
pub struct Connection {
    subscription: Subscription,
    cipher: Arc<Cipher>,
}

impl Connection {
    pub(crate) fn new(subscription: Subscription, cipher: Arc<Cipher>) -> Self {
        Self {
            subscription,
            cipher,
        }
    }

    pub fn id(&self) -> &SubscriberId {
        self.subscription.id()
    }

    /// Wait for the next event and return it encrypted and base64url encoded.
    ///
    /// An event that fails to encrypt is logged and skipped. Returns `None` once the
    /// bus has been closed.
    pub async fn next_frame(&mut self) -> Option<String> {
        loop {
            let event = self.subscription.recv().await?;
            match self.cipher.encrypt_encoded(event.as_bytes()) {
                Ok(payload) => {
                    trace!(
                        "Sending event {} to SSE connection {}",
                        event.id(),
                        self.id()
                    );
                    return Some(payload);
                }
                Err(e) => error!(
                    "Failed to encrypt event {} for SSE connection {}: {e}",
                    event.id(),
                    self.id()
                ),
            }
        }
    }

    /// Turn the connection into the body stream of an SSE response.
    ///
    /// Each frame is written as `data: <payload>\n\n`. Dropping the stream (axum does this
    /// when the client goes away) drops the subscription and deregisters it from the bus.
    pub fn into_stream(self) -> impl Stream<Item = Result<SseEvent, Infallible>> {
        stream! {
            let mut connection = self;
            while let Some(payload) = connection.next_frame().await {
                yield Ok(SseEvent::default().data(payload));
            }
            debug!("Event bus closed, ending SSE stream {}", connection.id());
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        info!("SSE connection {} closed", self.id());
    }
}
