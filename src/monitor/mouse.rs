//! Mouse press/release pairing and move throttling.
//!
//! A press is logged as a click straight away and remembered as the start of
//! a movement; the matching release emits one [`MouseMovement`] from that
//! start to the release position. Moves are sampled at most once per
//! throttle window and only ever supply a provisional start when no press
//! is pending.

use crate::store::{EventPayload, EventQueue, MouseMovement, ScreenPosition};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MouseState {
    pending_start: Option<ScreenPosition>,
    last_move_sample: Option<Instant>,
}

/// Coalesces raw mouse input into click and movement events.
#[derive(Debug)]
pub struct MouseEventCoalescer {
    queue: Arc<EventQueue>,
    throttle: Duration,
    state: Mutex<MouseState>,
}

impl MouseEventCoalescer {
    pub fn new(queue: Arc<EventQueue>, throttle: Duration) -> Self {
        Self {
            queue,
            throttle,
            state: Mutex::new(MouseState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MouseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pressed(&self, position: ScreenPosition, button: &str) {
        let mut state = self.lock();
        self.queue.enqueue(EventPayload::MouseClick {
            position,
            button: button.to_string(),
        });
        state.pending_start = Some(position);
    }

    /// Emits a movement if a start is pending; otherwise a no-op.
    pub fn released(&self, position: ScreenPosition) {
        let mut state = self.lock();
        if let Some(start_position) = state.pending_start.take() {
            self.queue.enqueue(EventPayload::MouseMovement(MouseMovement {
                start_position,
                end_position: position,
            }));
        }
    }

    pub fn moved(&self, position: ScreenPosition) {
        self.moved_at(position, Instant::now());
    }

    pub fn moved_at(&self, position: ScreenPosition, at: Instant) {
        let mut state = self.lock();
        let due = state
            .last_move_sample
            .is_none_or(|last| at.saturating_duration_since(last) >= self.throttle);
        if !due {
            return;
        }

        if state.pending_start.is_none() {
            state.pending_start = Some(position);
        }
        state.last_move_sample = Some(at);
    }

    /// Drops any pending start (used when listeners stop).
    pub fn reset(&self) {
        *self.lock() = MouseState::default();
    }
}
