//! Ladders multiplayer game server.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod broadcaster;
mod config;
mod playback;
mod protocol;
mod room;
mod server;
mod session;

use config::ServerConfig;
use server::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    info!(
        "Starting Ladders server (board of {} cells, {}s turns)...",
        config.default_board.size(),
        config.session.turn_seconds
    );

    let state = Arc::new(ServerState::new(config));

    server::run_server(state).await
}
