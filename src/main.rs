use domain::{Cipher, SecretKey};
use log::*;
use push::Publisher;
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config as &Config);

    info!("Starting webhook relay...");

    let secret_key = match config.secret_key() {
        Some(secret_key) => secret_key.parse::<SecretKey>(),
        None => {
            error!("SECRET_KEY environment variable is required (32 characters)");
            std::process::exit(1);
        }
    };
    let secret_key = match secret_key {
        Ok(secret_key) => secret_key,
        Err(e) => {
            error!("SECRET_KEY must be 32 characters long: {e}");
            std::process::exit(1);
        }
    };

    let app_state = web::AppState::new(config, Cipher::new(&secret_key));

    let publisher = Publisher::new(
        &app_state.bus,
        Arc::clone(&app_state.cipher),
        Arc::clone(&app_state.hub_clients),
    )
    .spawn();

    if let Err(e) = web::init_server(app_state).await {
        error!("Failed to start server: {e}");
        std::process::exit(1);
    }

    // The bus is closed on shutdown, so the publisher finishes on its own
    if let Err(e) = publisher.await {
        warn!("Push publisher ended abnormally: {e}");
    }
    info!("Webhook relay stopped");
}
