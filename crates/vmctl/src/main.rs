//! aerovm coordinator (vmctl)
//!
//! Builds the init bundle, spawns the CPU/I-O/GPU worker threads, and
//! exposes a small operator-facing HTTP/WebSocket surface for status and
//! debug commands.
//!
//! Default bind: 127.0.0.1:8872
//! WebSocket: /events
//! REST API: /status, /health, /debug/command

mod api;
mod config;
mod coordinator;
mod tracing_layer;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::VmConfig;
use coordinator::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    let config = VmConfig::from_env();
    let coordinator = Arc::new(Coordinator::start(&config));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true).with_thread_names(true))
        .with(tracing_layer::EventBroadcastLayer::new(coordinator.events.clone()))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,vmctl=debug")))
        .init();

    info!("starting aerovm coordinator");
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let bind_addr: SocketAddr = config.status_bind_addr.parse()?;
    info!(%bind_addr, "binding status surface");

    let app = api::create_router(coordinator);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("vmctl listening on http://{}", bind_addr);
    info!("websocket events: ws://{}/events", bind_addr);
    info!("swagger ui: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
