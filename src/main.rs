mod api;
mod auth;
mod config;
mod db;
mod error;
mod media;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() {
    // Loads `.env` first, so RUST_LOG from it reaches the filter below.
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting social backend...");

    let result = match config {
        Ok(config) => api::server::start_server(config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
