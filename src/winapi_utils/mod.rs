//! Safe wrappers around Windows API calls.
//!
//! Foreground window queries, low-level hook guards, the message loop the
//! hooks need, and native alert boxes.

pub mod dialog;
pub mod hooks;
pub mod message_loop;
pub mod window;

pub use dialog::*;
pub use hooks::*;
pub use message_loop::*;
pub use window::*;
