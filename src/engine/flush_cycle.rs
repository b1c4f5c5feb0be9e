//! Fixed-interval drain/persist/predict loop.
//!
//! Each cycle drains the queue, persists the batch, forwards it to the
//! backend, scores it and updates the unfocused-time counter. Every failure
//! is caught and logged here; the next cycle always runs on schedule.

use super::intervention::InterventionTrigger;
use super::state::MonitorContext;
use crate::collaborators::Predictor;
use crate::error::{CollaboratorError, MonitorError, Result};
use crate::store::Event;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outcome of one flush cycle, broadcast to status clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub batch_size: usize,
    /// Length of the persisted log after this cycle; `None` if the write failed.
    pub persisted_total: Option<usize>,
    /// `None` for an empty batch or a failed prediction.
    pub score: Option<f64>,
    pub unfocused_secs: u64,
    pub intervention_fired: bool,
}

pub struct FlushPredictCycle {
    ctx: MonitorContext,
    predictor: Arc<dyn Predictor>,
    intervention: Arc<InterventionTrigger>,
}

impl FlushPredictCycle {
    pub fn new(
        ctx: MonitorContext,
        predictor: Arc<dyn Predictor>,
        intervention: Arc<InterventionTrigger>,
    ) -> Self {
        Self {
            ctx,
            predictor,
            intervention,
        }
    }

    /// Runs one complete cycle.
    ///
    /// If the append to the persisted log fails, the batch is still scored;
    /// its events stay with the log and are written ahead of the next batch.
    pub fn run_cycle(&self) -> CycleReport {
        let (batch, persisted) = self.ctx.log.drain_and_persist(&self.ctx.queue);
        let persisted_total = match persisted {
            Ok(total) => Some(total),
            Err(e) => {
                tracing::warn!(error = %e, batch = batch.len(), "Failed to persist batch");
                None
            }
        };

        if let Some(backend) = &self.ctx.backend {
            backend.submit(&batch);
        }

        let score = if batch.is_empty() {
            None
        } else {
            match self.score(&batch) {
                Ok(score) => Some(score),
                Err(e) => {
                    tracing::warn!(error = %e, batch = batch.len(), "Prediction failed, skipping cycle assessment");
                    None
                }
            }
        };

        let mut intervention_fired = false;
        if let Some(score) = score {
            let state = &self.ctx.state;
            let unfocused = if score < self.ctx.config.focus_score_threshold {
                state.unfocused_duration() + self.ctx.config.flush_interval
            } else {
                Duration::ZERO
            };
            state.set_unfocused_duration(unfocused);

            if unfocused >= self.ctx.config.unfocus_threshold {
                self.intervention.fire();
                intervention_fired = true;
            }
        }

        let report = CycleReport {
            batch_size: batch.len(),
            persisted_total,
            score,
            unfocused_secs: self.ctx.state.unfocused_duration().as_secs(),
            intervention_fired,
        };

        tracing::info!(
            batch = report.batch_size,
            score = ?report.score,
            unfocused_secs = report.unfocused_secs,
            "Flush cycle complete"
        );
        self.ctx.broadcast("cycle", &report);
        report
    }

    /// Drains the queue into the persisted log without scoring.
    ///
    /// Used by the survey scheduler right after a focus report and by the
    /// lifecycle on shutdown.
    pub fn flush_to_log(&self) -> Result<usize> {
        flush_to_log(&self.ctx)
    }

    fn score(&self, batch: &[Event]) -> Result<f64> {
        let score = self.predictor.predict(batch)?;
        if !(0.0..=1.0).contains(&score) {
            return Err(MonitorError::Collaborator(CollaboratorError::InvalidInput(
                format!("predictor returned out-of-range score {score}"),
            )));
        }
        Ok(score)
    }

    /// Loops one cycle per `flush_interval` until the run flag is cleared.
    ///
    /// A cycle in progress always completes before the loop exits.
    pub fn run(&self) {
        let interval = self.ctx.config.flush_interval;
        tracing::info!(interval_secs = interval.as_secs(), "Flush cycle loop started");

        let run = self.ctx.run_flag();
        while run.sleep(interval) {
            self.run_cycle();
        }

        tracing::info!("Flush cycle loop stopped");
    }
}

/// Shared by the survey and shutdown paths.
pub(crate) fn flush_to_log(ctx: &MonitorContext) -> Result<usize> {
    let (batch, persisted) = ctx.log.drain_pending(&ctx.queue);
    if !batch.is_empty() {
        if let Some(backend) = &ctx.backend {
            backend.submit(&batch);
        }
    }
    if let Some(total) = persisted? {
        tracing::debug!(batch = batch.len(), total, "Flushed queue to log");
    }
    Ok(batch.len())
}

pub fn spawn_flush_cycle(cycle: FlushPredictCycle) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("flush-cycle".to_string())
        .spawn(move || cycle.run())
        .map_err(|source| MonitorError::Spawn {
            name: "flush cycle",
            source,
        })
}
