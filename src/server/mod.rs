/// HTTP API and WebSocket server
/// Serves metric snapshots, profiling, and the live subscriber feed

pub mod auth;
pub mod handlers;
pub mod hub;
pub mod publisher;
pub mod routes;
pub mod websocket;

pub use hub::{Envelope, Hub};
pub use routes::create_router;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::collector::MetricsCollector;
use crate::utils::AppConfig;
use auth::OwnerResolver;
use websocket::WsSettings;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub collector: MetricsCollector,
    pub hub: Hub,
    pub owners: Arc<OwnerResolver>,
    pub config: Arc<AppConfig>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn ws_settings(&self) -> WsSettings {
        WsSettings {
            ping_interval: self.config.server.ping_interval(),
            read_deadline: self.config.server.read_deadline(),
            max_message_bytes: self.config.server.max_message_bytes.max(1),
        }
    }
}

/// Run the server until Ctrl-C
pub async fn run(config: AppConfig, collector: MetricsCollector) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server.bind_address()))?;

    let cancel = CancellationToken::new();
    let hub = Hub::spawn(config.server.queue_capacity, cancel.clone());
    let publisher = publisher::spawn_publisher(
        collector.clone(),
        hub.clone(),
        config.server.publish_interval(),
        cancel.clone(),
    );

    let auth_enabled = !config.tokens.is_empty();
    let cors = config.server.cors;
    let state = AppState {
        collector,
        hub,
        owners: Arc::new(OwnerResolver::new(config.tokens.clone())),
        config: Arc::new(config),
        cancel: cancel.clone(),
    };
    let app = create_router(state, cors);

    println!("🚀 cm-monitor server");
    println!("   🔌 API:       http://{}/api", addr);
    println!("   📡 WebSocket: ws://{}/ws", addr);
    if auth_enabled {
        println!("   🔒 Auth:      Enabled (token required for profiling)");
    } else {
        println!("   ⚠️  Auth:      Disabled (no tokens configured)");
    }
    println!();
    println!("📚 API Endpoints:");
    println!("   GET  /api/health                - Runtime and hub health");
    println!("   GET  /api/metrics               - Metrics for all running containers");
    println!("   GET  /api/metrics/:id           - Metrics for one container");
    println!("   POST /api/profile/:id?duration= - Profile and recommend limits");
    println!("   GET  /ws                        - Live updates");
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.cancelled() => {}
            }
            info!("shutting down");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    cancel.cancel();
    let _ = publisher.await;
    Ok(())
}
