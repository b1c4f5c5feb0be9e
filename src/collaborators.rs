//! Capability interfaces for the engine's external collaborators.
//!
//! The pipeline only ever talks to scoring, training, gaze estimation,
//! window queries and user prompts through these traits, so any
//! implementation can be swapped in without touching the loops.

use crate::error::CollaboratorError;
use crate::store::{Event, GazeSample};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Scores a batch of events. `1.0` is fully focused, `0.0` fully unfocused.
pub trait Predictor: Send + Sync {
    /// Must not mutate the batch; fails with `InvalidInput` on malformed input.
    fn predict(&self, batch: &[Event]) -> Result<f64, CollaboratorError>;
}

/// Retrains the focus model from the accumulated log.
pub trait Trainer: Send + Sync {
    /// Sessions without a closing focus report are skipped, not fatal.
    fn retrain(&self, log: &[Event]) -> Result<(), CollaboratorError>;
}

/// Produces gaze estimates from a camera.
///
/// `open` and `close` bracket the sampler thread's lifetime, so the camera
/// handle is held only while monitoring runs.
pub trait GazeSource: Send {
    fn open(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }

    /// `Ok(None)` means no face was detected in this frame.
    fn sample(&mut self) -> Result<Option<GazeSample>, CollaboratorError>;

    fn close(&mut self) {}
}

/// Reports the title of the window that currently has focus.
pub trait ActiveWindowSource: Send {
    /// `Ok(None)` when nothing has focus (desktop, lock screen).
    fn active_window_title(&mut self) -> Result<Option<String>, CollaboratorError>;
}

/// Result of a focus survey prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// Self-reported focus level, 0..=10.
    Submitted(u8),
    Dismissed,
}

/// Sending half of a pending prompt, held by the presentation layer.
#[derive(Debug)]
pub struct PromptResponder(Sender<PromptOutcome>);

impl PromptResponder {
    pub fn submit(self, level: u8) {
        let _ = self.0.send(PromptOutcome::Submitted(level));
    }

    pub fn dismiss(self) {
        let _ = self.0.send(PromptOutcome::Dismissed);
    }
}

/// Receiving half of a pending prompt, awaited by the survey scheduler.
#[derive(Debug)]
pub struct PromptReply(Receiver<PromptOutcome>);

impl PromptReply {
    /// Creates a linked responder/reply pair.
    pub fn channel() -> (PromptResponder, PromptReply) {
        let (tx, rx) = mpsc::channel();
        (PromptResponder(tx), PromptReply(rx))
    }

    /// A reply that is already resolved.
    pub fn ready(outcome: PromptOutcome) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(outcome);
        PromptReply(rx)
    }

    /// Waits up to `timeout` for the user.
    ///
    /// Returns `None` while still pending. A responder dropped without an
    /// answer counts as dismissed.
    pub fn wait(&self, timeout: Duration) -> Option<PromptOutcome> {
        match self.0.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(PromptOutcome::Dismissed),
        }
    }
}

/// User-facing popups: the focus survey and the intervention alert.
pub trait UserPrompt: Send + Sync {
    /// Shows the focus survey; the answer arrives through the reply.
    fn request_focus_level(&self) -> PromptReply;

    /// Shows a modal, single-acknowledgement alert. Must not block the
    /// caller until the user acknowledges it.
    fn show_alert(&self, title: &str, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_reply_pending_then_answered() {
        let (responder, reply) = PromptReply::channel();
        assert_eq!(reply.wait(Duration::from_millis(5)), None);

        responder.submit(7);
        assert_eq!(
            reply.wait(Duration::from_millis(5)),
            Some(PromptOutcome::Submitted(7))
        );
    }

    #[test]
    fn test_dropped_responder_counts_as_dismissed() {
        let (responder, reply) = PromptReply::channel();
        drop(responder);
        assert_eq!(
            reply.wait(Duration::from_millis(5)),
            Some(PromptOutcome::Dismissed)
        );
    }

    #[test]
    fn test_ready_reply() {
        let reply = PromptReply::ready(PromptOutcome::Submitted(3));
        assert_eq!(reply.wait(Duration::ZERO), Some(PromptOutcome::Submitted(3)));
    }
}
