//! Event storage.
//!
//! Provides the shared in-memory event queue that every producer writes to,
//! the event data types, and durable storage for flushed batches.

pub mod event_queue;
pub mod persistence;
pub mod types;

pub use event_queue::*;
pub use persistence::*;
pub use types::*;
