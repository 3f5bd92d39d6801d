//! chatd: real-time chat server binary.
//!
//! Wires configuration, the directory store, code delivery, the HTTP
//! health endpoint and the chat listener together.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use chatd::config::{Config, StoreBackend};
use chatd::delivery::{CodeDelivery, ConsoleDelivery, RelayDelivery};
use chatd::health;
use chatd::server;
use chatd::state::AppState;
use chatd::store::{DirectoryStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present (local dev).
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Tracing.
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(&config.log_level)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(&config.log_level)
            .with_target(true)
            .init();
    }

    info!("chatd starting");
    info!(listen = %config.listen_addr, health = %config.health_addr, instance = %config.server_instance);

    // ── Directory store ─────────────────────────────────────
    let store: Arc<dyn DirectoryStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pg = PgStore::connect(&config.database_url, 20).await?;
            info!("running migrations");
            pg.migrate().await?;
            info!("database ready");
            Arc::new(pg)
        }
        StoreBackend::Memory => {
            warn!("using in-memory store, nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // ── Verification code delivery ──────────────────────────
    let delivery: Arc<dyn CodeDelivery> = match &config.mail_relay_url {
        Some(url) => {
            info!(relay = %url, "verification codes via mail relay");
            Arc::new(RelayDelivery::new(url.as_str(), config.mail_from.as_str()))
        }
        None => {
            info!("no mail relay configured, verification codes go to the log");
            Arc::new(ConsoleDelivery)
        }
    };

    // ── Shared state ────────────────────────────────────────
    let state = AppState::new(config.clone(), store, delivery);

    // ── Health endpoint ─────────────────────────────────────
    let health_listener = TcpListener::bind(&config.health_addr).await?;
    let app = health::router(Arc::clone(&state));
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, app).await {
            error!("health server error: {e}");
        }
    });

    // ── Chat listener ───────────────────────────────────────
    let listener = TcpListener::bind(&config.listen_addr).await?;
    server::serve_until_ctrl_c(listener, state).await?;

    info!("chatd stopped");
    Ok(())
}
