//! Tally server
//!
//! HTTP + WebSocket backend for the Tally expense tracker.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TALLY_CONFIG`: Path to config file (default: ~/.config/tally/config.yaml)
//! - `TALLY_DATABASE_PATH`: Path to the SQLite database
//! - `TALLY_PORT`: Port to listen on (default: 8080)
//! - `TALLY_TOKEN_TTL_DAYS`: Login token lifetime in days (default: 30)

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally::config::Config;
use tally::db::init_db;
use tally::server::{self, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("TALLY_CONFIG").ok().map(PathBuf::from);
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Database: {}", config.database_path.display());

    let pool = match init_db(Some(config.database_path.clone())).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(pool, config.token_ttl_days);
    let app = server::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
