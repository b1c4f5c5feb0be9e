//! Periodic eye-tracker sampling.

use crate::collaborators::GazeSource;
use crate::engine::RunFlag;
use crate::error::{MonitorError, Result};
use crate::store::{EventPayload, EventQueue};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Turns gaze samples into queue events.
pub struct GazeSampler {
    source: Box<dyn GazeSource>,
    queue: Arc<EventQueue>,
}

impl GazeSampler {
    pub fn new(source: Box<dyn GazeSource>, queue: Arc<EventQueue>) -> Self {
        Self { source, queue }
    }

    /// Takes one sample. Returns whether an event was logged.
    pub fn sample_once(&mut self) -> Result<bool> {
        match self.source.sample() {
            Ok(Some(sample)) => {
                tracing::trace!("Gaze sample captured");
                self.queue.enqueue(EventPayload::GazeSample(sample));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(MonitorError::Producer(format!("gaze sample: {e}"))),
        }
    }
}

/// Spawns the gaze sampling thread.
///
/// The device is opened on the sampling thread and closed before it exits;
/// the sampler is handed back through the join handle. If the device fails
/// to open, the thread logs a warning and ends without sampling; the rest
/// of the monitor is unaffected.
pub fn spawn_gaze_sampler(
    mut sampler: GazeSampler,
    run: RunFlag,
    interval: Duration,
) -> Result<JoinHandle<GazeSampler>> {
    thread::Builder::new()
        .name("gaze-sampler".to_string())
        .spawn(move || {
            if let Err(e) = sampler.source.open() {
                tracing::warn!(error = %e, "Gaze device unavailable, sampling disabled");
                return sampler;
            }

            tracing::info!(
                interval_ms = interval.as_millis(),
                "Gaze sampling thread started"
            );

            while run.is_running() {
                if let Err(e) = sampler.sample_once() {
                    tracing::warn!(error = %e, "Gaze sample failed");
                }
                if !run.sleep(interval) {
                    break;
                }
            }

            sampler.source.close();
            tracing::info!("Gaze sampling thread shutting down");
            sampler
        })
        .map_err(|source| MonitorError::Spawn {
            name: "gaze sampler",
            source,
        })
}
