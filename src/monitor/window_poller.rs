//! Active window polling.
//!
//! This module provides the polling loop that watches the focused window
//! and logs an `active_window` event whenever its title changes.

use crate::collaborators::ActiveWindowSource;
use crate::engine::RunFlag;
use crate::error::{MonitorError, Result};
use crate::store::{EventPayload, EventQueue};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the window poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How often to poll for window changes (default: 2s).
    pub poll_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Emits an event per observed change of the focused window's title.
pub struct WindowWatcher {
    source: Box<dyn ActiveWindowSource>,
    queue: Arc<EventQueue>,
    last_title: Option<String>,
}

impl WindowWatcher {
    pub fn new(source: Box<dyn ActiveWindowSource>, queue: Arc<EventQueue>) -> Self {
        Self {
            source,
            queue,
            last_title: None,
        }
    }

    /// Performs a single poll cycle. Returns whether an event was logged.
    ///
    /// No focused window, or an empty title, leaves the last observation
    /// untouched.
    pub fn poll_once(&mut self) -> Result<bool> {
        let title = self
            .source
            .active_window_title()
            .map_err(|e| MonitorError::Producer(format!("active window query: {e}")))?;

        let Some(title) = title.filter(|t| !t.is_empty()) else {
            return Ok(false);
        };

        if self.last_title.as_deref() == Some(title.as_str()) {
            return Ok(false);
        }

        tracing::debug!(title = %title, "Active window changed");
        self.queue.enqueue(EventPayload::WindowActivity {
            title: title.clone(),
        });
        self.last_title = Some(title);
        Ok(true)
    }
}

/// Spawns the window polling thread.
///
/// The thread polls once per interval until the run flag is cleared, then
/// hands the watcher back through the join handle. A failed query is
/// logged and skipped; polling continues at the normal rate.
pub fn spawn_window_watcher(
    mut watcher: WindowWatcher,
    run: RunFlag,
    config: PollerConfig,
) -> Result<JoinHandle<WindowWatcher>> {
    thread::Builder::new()
        .name("window-watcher".to_string())
        .spawn(move || {
            tracing::info!(
                interval_ms = config.poll_interval.as_millis(),
                "Window polling thread started"
            );

            while run.is_running() {
                if let Err(e) = watcher.poll_once() {
                    tracing::warn!(error = %e, "Window poll failed, skipping sample");
                }
                if !run.sleep(config.poll_interval) {
                    break;
                }
            }

            tracing::info!("Window polling thread shutting down");
            watcher
        })
        .map_err(|source| MonitorError::Spawn {
            name: "window watcher",
            source,
        })
}
