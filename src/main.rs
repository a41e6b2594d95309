mod api;
mod config;
mod engine;
mod error;
mod geo;
mod lifecycle;
mod models;
mod observability;
mod resolver;
mod state;

use std::sync::Arc;

use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::engine::delivery::run_delivery_engine;
use crate::engine::gateway::{HttpPushGateway, MessagingGateway};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(state::AppState::new(
        config.event_buffer_size,
        config.broadcast_batch_size,
        config.default_radius_m,
    ));

    let app = api::rest::router(shared_state.clone());

    let gateway: Arc<dyn MessagingGateway> = Arc::new(HttpPushGateway::new(
        config.push_endpoint.clone(),
        config.channel_token.clone(),
    ));
    tokio::spawn(run_delivery_engine(
        shared_state.clone(),
        gateway,
        Duration::from_secs(config.broadcast_poll_secs),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
