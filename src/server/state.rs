//! Shared application state for the HTTP server.

use crate::engine::MonitorContext;
use crate::settings::SettingsStore;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ctx: MonitorContext,
    /// Present when the monitor was configured from a settings store.
    pub settings: Option<Arc<SettingsStore>>,
}

impl AppState {
    pub fn new(ctx: MonitorContext, settings: Option<Arc<SettingsStore>>) -> Self {
        Self { ctx, settings }
    }

    /// Subscribes to monitor updates, if the context broadcasts any.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        self.ctx.broadcast_tx.as_ref().map(broadcast::Sender::subscribe)
    }
}
