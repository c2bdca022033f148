//! HTTP surface of the relay: the webhook intake, the SSE stream and the push hub endpoints.

use domain::Cipher;
use events::Bus;
use log::*;
use push::{Hub, HubClients, RelayHub, SessionOptions};
use service::config::Config;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

pub(crate) mod controller;
mod error;
pub(crate) mod router;

pub use error::{Error, Result};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub bus: Bus,
    pub cipher: Arc<Cipher>,
    pub sse_manager: Arc<sse::Manager>,
    pub hub: Arc<dyn Hub>,
    pub hub_clients: Arc<HubClients>,
}

impl AppState {
    pub fn new(config: Config, cipher: Cipher) -> Self {
        let bus = Bus::new(config.subscriber_queue_capacity);
        let cipher = Arc::new(cipher);
        let sse_manager = Arc::new(sse::Manager::new(bus.clone(), Arc::clone(&cipher)));
        let hub_clients = Arc::new(HubClients::new(config.subscriber_queue_capacity));
        let hub: Arc<dyn Hub> = Arc::new(RelayHub);
        hub.initialize(&hub_clients);

        Self {
            config,
            bus,
            cipher,
            sse_manager,
            hub,
            hub_clients,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            keep_alive: self.config.push_keep_alive(),
            handshake_timeout: self.config.push_handshake_timeout(),
        }
    }

    /// End every SSE stream, the push publisher and every push session.
    pub fn shutdown(&self) {
        self.bus.close();
        self.hub_clients.close_all();
    }
}

/// Bind the configured interface and port and serve until ctrl-c.
pub async fn init_server(app_state: AppState) -> io::Result<()> {
    let addr = app_state
        .config
        .listen_addr()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server starting... listening for connections on http://{addr}");
    info!("Webhook endpoint: http://{addr}/webhook");
    info!("SSE endpoint: http://{addr}/sse");
    info!("Push hub endpoint: http://{addr}/signalr");

    serve(listener, app_state).await
}

/// Serve on an already bound listener until ctrl-c.
pub async fn serve(listener: TcpListener, app_state: AppState) -> io::Result<()> {
    let router = router::define_routes(app_state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(app_state))
        .await
}

async fn shutdown_signal(app_state: AppState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, closing client connections");
    app_state.shutdown();
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use clap::Parser;

    pub(crate) const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";

    pub(crate) fn config(args: &[&str]) -> Config {
        let args = std::iter::once("webhook_relay")
            .chain(["--secret-key", TEST_KEY])
            .chain(args.iter().copied());
        Config::try_parse_from(args).unwrap()
    }

    pub(crate) fn app_state() -> AppState {
        app_state_with(&[])
    }

    pub(crate) fn app_state_with(args: &[&str]) -> AppState {
        AppState::new(config(args), Cipher::new(&TEST_KEY.parse().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use events::{Event, SubscriberKind};

    #[tokio::test]
    async fn test_app_state_uses_configured_capacity() {
        let app_state = app_state_with(&["--subscriber-queue-capacity", "3"]);
        assert_eq!(app_state.bus.capacity(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_closes_bus_subscriptions() {
        let app_state = app_state();
        let mut subscription = app_state.bus.subscribe(SubscriberKind::Sse);

        app_state.shutdown();

        assert!(app_state.bus.is_closed());
        assert!(subscription.recv().await.is_none());
        assert_eq!(app_state.bus.publish(Event::new("late")).delivered, 0);
    }
}
