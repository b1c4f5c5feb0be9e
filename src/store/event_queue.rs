//! Thread-safe ordered event buffer.
//!
//! The queue is the single serialization point for every producer thread.
//! Timestamps and `time_delta` are assigned inside the same critical section
//! as the append, so queue order and timestamp order always agree.

use super::types::{Batch, Event, EventPayload};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct QueueInner {
    events: Vec<Event>,

    /// Timestamp of the most recently enqueued event, across drains.
    last_timestamp: Option<DateTime<Utc>>,

    total_enqueued: u64,
}

/// Append / drain-all buffer shared by all producers and the flush cycle.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // A producer that panicked mid-append cannot leave a half-written
        // event behind; the buffer is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event stamped with the current time.
    ///
    /// The timestamp is clamped to never precede the previous event's, so a
    /// wall-clock step backwards cannot reorder the log.
    pub fn enqueue(&self, payload: EventPayload) -> DateTime<Utc> {
        let mut inner = self.lock();

        let now = Utc::now();
        let timestamp = match inner.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };

        let kind = payload.kind();
        let mut event = Event::new(timestamp, payload);
        event.time_delta = inner.last_timestamp.map(|last| timestamp - last);

        inner.last_timestamp = Some(timestamp);
        inner.total_enqueued += 1;
        inner.events.push(event);

        tracing::trace!(kind = kind.as_str(), "Event enqueued");
        timestamp
    }

    /// Atomically takes every queued event, leaving the queue empty.
    pub fn drain_all(&self) -> Batch {
        std::mem::take(&mut self.lock().events)
    }

    /// Number of events waiting for the next drain.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events enqueued since the queue was created.
    pub fn total_enqueued(&self) -> u64 {
        self.lock().total_enqueued
    }
}
