//! Shared monitor state and the context handed to every loop.
//!
//! There is no ambient global state: the lifecycle builds one
//! [`MonitorContext`] per monitor and clones it into each thread. Every
//! counter in [`MonitorState`] has exactly one writing loop; readers
//! tolerate values that are one cycle stale.

use crate::backend::BackendClient;
use crate::settings::MonitorConfig;
use crate::store::{EventQueue, PersistenceLog};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// The cooperative `running` flag.
///
/// Loops poll it once per period and sleep through [`RunFlag::sleep`], which
/// wakes immediately when the flag is cleared, so shutdown latency is bounded
/// by the step in progress rather than the full sleep.
#[derive(Debug, Clone, Default)]
pub struct RunFlag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = false;
        cvar.notify_all();
    }

    pub fn is_running(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` or until stopped. Returns whether still running.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |running| *running)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Process-wide monitor counters.
#[derive(Debug)]
pub struct MonitorState {
    run: RunFlag,

    /// Written by the flush cycle.
    unfocused_ms: AtomicU64,

    /// Written by the survey scheduler.
    focus_session_count: AtomicU32,
    next_survey_interval_ms: AtomicU64,
    last_survey_time: Mutex<Instant>,

    /// Written by the keyboard aggregator; true while a session is open.
    keyboard_session_active: Arc<AtomicBool>,
}

impl MonitorState {
    pub fn new(run: RunFlag) -> Self {
        Self {
            run,
            unfocused_ms: AtomicU64::new(0),
            focus_session_count: AtomicU32::new(0),
            next_survey_interval_ms: AtomicU64::new(0),
            last_survey_time: Mutex::new(Instant::now()),
            keyboard_session_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resets the counters for a new run.
    pub(crate) fn reset(&self, initial_survey_delay: Duration) {
        self.unfocused_ms.store(0, Ordering::SeqCst);
        self.focus_session_count.store(0, Ordering::SeqCst);
        self.next_survey_interval_ms
            .store(duration_ms(initial_survey_delay), Ordering::SeqCst);
        *self
            .last_survey_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.keyboard_session_active.store(false, Ordering::SeqCst);
    }

    pub fn run_flag(&self) -> &RunFlag {
        &self.run
    }

    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    pub fn unfocused_duration(&self) -> Duration {
        Duration::from_millis(self.unfocused_ms.load(Ordering::SeqCst))
    }

    pub(crate) fn set_unfocused_duration(&self, value: Duration) {
        self.unfocused_ms.store(duration_ms(value), Ordering::SeqCst);
    }

    pub fn focus_session_count(&self) -> u32 {
        self.focus_session_count.load(Ordering::SeqCst)
    }

    pub fn next_survey_interval(&self) -> Duration {
        Duration::from_millis(self.next_survey_interval_ms.load(Ordering::SeqCst))
    }

    pub fn last_survey_time(&self) -> Instant {
        *self
            .last_survey_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a finished survey interaction and schedules the next one.
    pub(crate) fn record_survey(&self, at: Instant, next_interval: Duration, counted: bool) {
        *self
            .last_survey_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = at;
        self.next_survey_interval_ms
            .store(duration_ms(next_interval), Ordering::SeqCst);
        if counted {
            self.focus_session_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Time left until the next survey is due (zero when overdue).
    pub fn survey_due_in(&self) -> Duration {
        let due = self.last_survey_time() + self.next_survey_interval();
        due.saturating_duration_since(Instant::now())
    }

    pub fn keyboard_session_active(&self) -> bool {
        self.keyboard_session_active.load(Ordering::SeqCst)
    }

    /// Flag handle given to the keyboard aggregator.
    pub fn keyboard_activity_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.keyboard_session_active)
    }
}

fn duration_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

/// Point-in-time view of the monitor, served by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub unfocused_secs: u64,
    pub focus_session_count: u32,
    pub next_survey_in_secs: u64,
    pub keyboard_session_active: bool,
    pub queued_events: usize,
    pub persisted_events: usize,
}

/// Everything a producer or consumer loop needs, passed at construction.
#[derive(Clone)]
pub struct MonitorContext {
    pub config: Arc<MonitorConfig>,
    pub queue: Arc<EventQueue>,
    pub log: Arc<PersistenceLog>,
    pub state: Arc<MonitorState>,
    pub backend: Option<BackendClient>,
    pub broadcast_tx: Option<broadcast::Sender<String>>,
}

impl MonitorContext {
    pub fn new(config: MonitorConfig) -> Self {
        let log = PersistenceLog::new(&config.data_dir);
        Self {
            config: Arc::new(config),
            queue: Arc::new(EventQueue::new()),
            log: Arc::new(log),
            state: Arc::new(MonitorState::new(RunFlag::new())),
            backend: None,
            broadcast_tx: None,
        }
    }

    pub fn run_flag(&self) -> &RunFlag {
        self.state.run_flag()
    }

    /// Sends an update to all connected WebSocket clients.
    pub fn broadcast(&self, update_type: &str, data: &impl Serialize) {
        if let Some(tx) = &self.broadcast_tx {
            let message = serde_json::json!({
                "type": update_type,
                "data": data,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            });
            if let Ok(json) = serde_json::to_string(&message) {
                // No subscribers is not an error.
                let _ = tx.send(json);
            }
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.state.is_running(),
            unfocused_secs: self.state.unfocused_duration().as_secs(),
            focus_session_count: self.state.focus_session_count(),
            next_survey_in_secs: self.state.survey_due_in().as_secs(),
            keyboard_session_active: self.state.keyboard_session_active(),
            queued_events: self.queue.len(),
            persisted_events: self.log.events().map(|events| events.len()).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_run_flag_sleep_interrupted_by_stop() {
        let flag = RunFlag::new();
        flag.start();

        let sleeper = flag.clone();
        let handle = thread::spawn(move || {
            let started = Instant::now();
            let still_running = sleeper.sleep(Duration::from_secs(30));
            (still_running, started.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        flag.stop();

        let (still_running, elapsed) = handle.join().unwrap();
        assert!(!still_running);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_run_flag_sleep_times_out_while_running() {
        let flag = RunFlag::new();
        flag.start();
        assert!(flag.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_sleep_when_stopped_returns_immediately() {
        let flag = RunFlag::new();
        assert!(!flag.sleep(Duration::from_secs(30)));
    }

    #[test]
    fn test_record_survey() {
        let state = MonitorState::new(RunFlag::new());
        state.reset(Duration::from_secs(1800));
        assert_eq!(state.next_survey_interval(), Duration::from_secs(1800));

        state.record_survey(Instant::now(), Duration::from_secs(3600), true);
        state.record_survey(Instant::now(), Duration::from_secs(3600), false);

        assert_eq!(state.focus_session_count(), 1);
        assert_eq!(state.next_survey_interval(), Duration::from_secs(3600));
        assert!(state.survey_due_in() > Duration::from_secs(3500));
    }

    #[test]
    fn test_broadcast_reaches_subscriber() {
        let mut ctx = MonitorContext::new(MonitorConfig::default());
        let (tx, mut rx) = broadcast::channel(4);
        ctx.broadcast_tx = Some(tx);

        ctx.broadcast("cycle", &serde_json::json!({ "batch_size": 3 }));

        let message: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(message["type"], "cycle");
        assert_eq!(message["data"]["batch_size"], 3);
    }
}
