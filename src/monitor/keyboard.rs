//! Keystroke debouncing into keyboard sessions.
//!
//! Raw keypresses are coalesced into [`KeyboardSession`] records: presses
//! closer together than the idle timeout extend the open session, and the
//! session is emitted once the keyboard has been quiet for the timeout.
//!
//! The idle timer is a dedicated thread waiting on a deadline. The keypress
//! handler and the timer share one lock, so a session is emitted exactly
//! once and never while a keypress is still being appended to it.

use crate::error::{MonitorError, Result};
use crate::store::{EventPayload, EventQueue, KeyboardSession};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct OpenSession {
    start: DateTime<Utc>,
    last: DateTime<Utc>,
    count: u32,
}

impl OpenSession {
    fn close(self) -> KeyboardSession {
        KeyboardSession {
            start: self.start,
            end: self.last,
            keystroke_count: self.count,
        }
    }
}

/// Session state machine (`IDLE` / `ACTIVE`) driven by explicit timestamps.
#[derive(Debug)]
pub struct KeyboardSessionTracker {
    open: Option<OpenSession>,
    timeout: chrono::Duration,
}

impl KeyboardSessionTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            open: None,
            timeout: chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Handles a keypress at `at`.
    ///
    /// Returns the previous session if this press arrived after the idle
    /// gap, in which case it has been closed and a fresh one opened.
    pub fn keypress(&mut self, at: DateTime<Utc>) -> Option<KeyboardSession> {
        match self.open.as_mut() {
            Some(session) if at - session.last < self.timeout => {
                session.last = session.last.max(at);
                session.count += 1;
                None
            }
            _ => {
                let stale = self.open.take().map(OpenSession::close);
                self.open = Some(OpenSession {
                    start: at,
                    last: at,
                    count: 1,
                });
                stale
            }
        }
    }

    /// Closes the open session, if any (idle timer fired).
    pub fn expire(&mut self) -> Option<KeyboardSession> {
        self.open.take().map(OpenSession::close)
    }

    /// True while in `ACTIVE`.
    pub fn is_active(&self) -> bool {
        self.open.is_some()
    }
}

#[derive(Debug)]
struct TimerState {
    tracker: KeyboardSessionTracker,
    deadline: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
    queue: Arc<EventQueue>,
    active: Arc<AtomicBool>,
    timeout: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, session: KeyboardSession) {
        tracing::trace!(keys = session.keystroke_count, "Keyboard session closed");
        self.queue.enqueue(EventPayload::KeyboardSession(session));
    }
}

/// Debounces keypresses into keyboard sessions and pushes them to the queue.
#[derive(Debug)]
pub struct KeyboardSessionAggregator {
    shared: Arc<Shared>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardSessionAggregator {
    /// `active` is set while a session is open; the survey scheduler reads it.
    pub fn new(queue: Arc<EventQueue>, active: Arc<AtomicBool>, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState {
                    tracker: KeyboardSessionTracker::new(timeout),
                    deadline: None,
                    shutdown: false,
                }),
                wake: Condvar::new(),
                queue,
                active,
                timeout,
            }),
            timer: Mutex::new(None),
        }
    }

    /// Starts the idle-timer thread.
    pub fn start(&self) -> Result<()> {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.is_some() {
            return Ok(());
        }
        self.shared.lock().shutdown = false;

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("keyboard-idle-timer".to_string())
            .spawn(move || run_idle_timer(&shared))
            .map_err(|source| MonitorError::Spawn {
                name: "keyboard idle timer",
                source,
            })?;
        *timer = Some(handle);
        Ok(())
    }

    pub fn key_pressed(&self) {
        self.key_pressed_at(Utc::now());
    }

    /// Records a keypress observed at `at` and re-arms the idle timer.
    pub fn key_pressed_at(&self, at: DateTime<Utc>) {
        let mut state = self.shared.lock();
        if let Some(stale) = state.tracker.keypress(at) {
            self.shared.emit(stale);
        }
        state.deadline = Some(Instant::now() + self.shared.timeout);
        self.shared.active.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    /// Emits the open session immediately, if any.
    pub fn flush(&self) {
        let mut state = self.shared.lock();
        state.deadline = None;
        if let Some(session) = state.tracker.expire() {
            self.shared.emit(session);
        }
        self.shared.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stops the timer thread and emits any open session.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            self.shared.wake.notify_all();
        }

        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Keyboard idle timer thread panicked");
            }
        }

        self.flush();
    }
}

fn run_idle_timer(shared: &Shared) {
    tracing::debug!(
        timeout_ms = shared.timeout.as_millis(),
        "Keyboard idle timer started"
    );

    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }

        match state.deadline {
            None => {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    state.deadline = None;
                    if let Some(session) = state.tracker.expire() {
                        shared.emit(session);
                    }
                    shared.active.store(false, Ordering::SeqCst);
                } else {
                    state = shared
                        .wake
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }

    tracing::debug!("Keyboard idle timer stopped");
}
