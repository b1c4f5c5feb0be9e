//! Local status API and live update feed.
//!
//! Read-only: a health check, the current monitor status, the stored
//! settings and a WebSocket that relays every update the monitor
//! broadcasts (`cycle`, `survey`, `intervention`).

pub mod routes;
pub mod state;
pub mod ws;

use crate::engine::MonitorContext;
use crate::error::{MonitorError, Result};
use crate::server::routes::{config, health, status};
use crate::server::state::AppState;
use crate::server::ws::ws_handler;
use crate::settings::SettingsStore;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

/// Capacity of the update channel; slower WebSocket clients skip updates.
pub const BROADCAST_CAPACITY: usize = 100;

/// Creates the channel monitor updates are broadcast on.
pub fn broadcast_channel() -> broadcast::Sender<String> {
    broadcast::channel::<String>(BROADCAST_CAPACITY).0
}

/// Builds the router for the given state.
pub fn router(state: AppState) -> Router {
    // CORS layer for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/status", get(status::get_status))
        .route("/api/config", get(config::get_config))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Starts the HTTP server on a background thread.
///
/// The port is bound before returning, so a port conflict is reported to
/// the caller. Returns the bound address.
pub fn start_server(
    ctx: MonitorContext,
    settings: Option<Arc<SettingsStore>>,
    port: u16,
) -> Result<SocketAddr> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = std::net::TcpListener::bind(addr)
        .and_then(|listener| {
            listener.set_nonblocking(true)?;
            Ok(listener)
        })
        .map_err(|source| MonitorError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| MonitorError::Bind { addr, source })?;

    let runtime = tokio::runtime::Runtime::new().map_err(|source| MonitorError::Spawn {
        name: "http server runtime",
        source,
    })?;
    let app = router(AppState::new(ctx, settings));

    std::thread::Builder::new()
        .name("http-server".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(e) => {
                        tracing::error!(?e, "Failed to register HTTP listener");
                        return;
                    }
                };
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(?e, "HTTP server stopped");
                }
            });
        })
        .map_err(|source| MonitorError::Spawn {
            name: "http server",
            source,
        })?;

    tracing::info!("HTTP server listening on http://{}", local_addr);
    Ok(local_addr)
}
