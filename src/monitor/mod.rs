//! Activity producers.
//!
//! This module contains the input aggregators (keyboard sessions, mouse
//! click/move coalescing), the raw input hooks that feed them, and the
//! window and gaze polling loops.

pub mod gaze_sampler;
pub mod input_hooks;
pub mod keyboard;
pub mod mouse;
pub mod window_poller;

pub use gaze_sampler::*;
pub use input_hooks::*;
pub use keyboard::*;
pub use mouse::*;
pub use window_poller::*;
