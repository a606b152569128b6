//! Real-time messaging core for the Stagecast casting marketplace.
//!
//! Layering, leaves first: the Dialog Store persists dialogs, participants,
//! messages, reactions and read receipts; the Chat Service applies business
//! rules and notifies the Connection Hub; the hub fans events out to live
//! connections; the protocol handler terminates each WebSocket session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

pub mod config;
pub mod context;
pub mod error;
pub mod frames;
pub mod hub;
pub mod model;
pub mod routes;
pub mod service;
pub mod store;
pub mod uploads;
pub mod utils;
pub mod ws;

use config::Config;
use context::AppContext;
use hub::ChatHub;
use service::ChatService;
use store::PgDialogStore;
use uploads::HttpUploadLookup;

pub async fn run_server(config: Config) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .acquire_timeout(Duration::from_secs(config.db.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.db.idle_timeout_secs))
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    let store = Arc::new(PgDialogStore::new(pool.clone()));

    // The hub is constructed once here and shut down on graceful
    // termination; it is injected, never ambient.
    let (hub, hub_task) = ChatHub::start(store.clone(), &config.chat);

    let uploads = Arc::new(HttpUploadLookup::new(config.upload_service_url.clone()));
    let service = Arc::new(ChatService::new(
        store,
        uploads,
        hub.clone(),
        config.chat.clone(),
    ));

    let config = Arc::new(config);
    let ctx = Arc::new(AppContext::new(service, hub.clone(), pool, config.clone()));
    let router = routes::create_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Chat server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain live connections before returning.
    hub.shutdown().await;
    hub_task.await?;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
