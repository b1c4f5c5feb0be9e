//! Heuristic focus predictor used when no learned model is plugged in.

use crate::collaborators::Predictor;
use crate::error::CollaboratorError;
use crate::store::{Event, EventPayload};
use std::time::Duration;

/// Relative weights of the three factors.
#[derive(Debug, Clone)]
pub struct BaselineWeights {
    pub typing: f64,
    pub window_stability: f64,
    pub gaze_presence: f64,
}

impl Default for BaselineWeights {
    fn default() -> Self {
        Self {
            typing: 0.4,
            window_stability: 0.4,
            gaze_presence: 0.2,
        }
    }
}

/// Scores a batch with a weighted average of typing rate, window
/// stability and gaze presence.
#[derive(Debug, Clone)]
pub struct BaselinePredictor {
    weights: BaselineWeights,
    /// Shortest span a batch is assumed to cover.
    min_span: Duration,
    /// Expected gap between gaze samples.
    gaze_interval: Duration,
}

impl Default for BaselinePredictor {
    fn default() -> Self {
        Self::new(
            BaselineWeights::default(),
            Duration::from_secs(60),
            Duration::from_millis(300),
        )
    }
}

impl BaselinePredictor {
    pub fn new(weights: BaselineWeights, min_span: Duration, gaze_interval: Duration) -> Self {
        Self {
            weights,
            min_span,
            gaze_interval,
        }
    }

    fn span_secs(&self, batch: &[Event]) -> f64 {
        let observed = match (batch.first(), batch.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp)
                .to_std()
                .unwrap_or_default(),
            _ => Duration::ZERO,
        };
        observed.max(self.min_span).as_secs_f64()
    }
}

/// Sigmoid over keystrokes per minute, centred on 40.
/// Approximately: 0 kpm ≈ 0.12, 40 kpm = 0.5, 100 kpm ≈ 0.95.
fn score_typing(keys_per_minute: f64) -> f64 {
    1.0 / (1.0 + (-0.05 * (keys_per_minute - 40.0)).exp())
}

/// 1 − window switches per event.
fn score_window_stability(switches: usize, events: usize) -> f64 {
    if events == 0 {
        return 0.5;
    }
    1.0 - (switches as f64 / events as f64).min(1.0)
}

/// Fraction of expected gaze samples that found a face; neutral without a tracker.
fn score_gaze_presence(samples: usize, expected: f64) -> f64 {
    if samples == 0 || expected <= 0.0 {
        return 0.5;
    }
    (samples as f64 / expected).min(1.0)
}

impl Predictor for BaselinePredictor {
    fn predict(&self, batch: &[Event]) -> Result<f64, CollaboratorError> {
        if batch.is_empty() {
            return Err(CollaboratorError::InvalidInput("empty batch".to_string()));
        }

        let mut keystrokes = 0u64;
        let mut switches = 0usize;
        let mut gaze_samples = 0usize;
        for event in batch {
            match &event.payload {
                EventPayload::KeyboardSession(session) => {
                    keystrokes += u64::from(session.keystroke_count)
                }
                EventPayload::WindowActivity { .. } => switches += 1,
                EventPayload::GazeSample(_) => gaze_samples += 1,
                _ => {}
            }
        }

        let span = self.span_secs(batch);
        let typing = score_typing(keystrokes as f64 * 60.0 / span);
        let stability = score_window_stability(switches, batch.len());
        let gaze = score_gaze_presence(gaze_samples, span / self.gaze_interval.as_secs_f64());

        let w = &self.weights;
        let total = w.typing + w.window_stability + w.gaze_presence;
        if total <= 0.0 {
            return Err(CollaboratorError::InvalidInput(
                "predictor weights sum to zero".to_string(),
            ));
        }

        let score =
            (w.typing * typing + w.window_stability * stability + w.gaze_presence * gaze) / total;
        tracing::debug!(typing, stability, gaze, score, "Baseline focus score");
        Ok(score.clamp(0.0, 1.0))
    }
}
