//! Monitor start/stop and the terminal retrain.
//!
//! [`ActivityMonitor`] owns every worker thread. `start` brings the whole
//! pipeline up or, if any piece fails, tears down what was started and
//! returns the error. `stop` winds the loops down, drains the last events
//! into the persisted log and hands the log to the trainer.

use super::flush_cycle::{flush_to_log, spawn_flush_cycle, FlushPredictCycle};
use super::intervention::InterventionTrigger;
use super::state::MonitorContext;
use super::survey::{spawn_survey_scheduler, FocusSurveyScheduler};
use crate::collaborators::{ActiveWindowSource, GazeSource, Predictor, Trainer, UserPrompt};
use crate::error::{MonitorError, Result};
use crate::monitor::{
    spawn_gaze_sampler, spawn_window_watcher, GazeSampler, InputHandle,
    KeyboardSessionAggregator, MouseEventCoalescer, PollerConfig, WindowWatcher,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// External collaborators plugged into a monitor.
pub struct Collaborators {
    pub predictor: Arc<dyn Predictor>,
    pub trainer: Arc<dyn Trainer>,
    pub prompt: Arc<dyn UserPrompt>,
    pub gaze_source: Option<Box<dyn GazeSource>>,
    pub window_source: Option<Box<dyn ActiveWindowSource>>,
    /// Install the platform's system-wide input hooks on start. Without
    /// them, raw input arrives only through [`ActivityMonitor::input`].
    pub capture_system_input: bool,
}

impl Collaborators {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        trainer: Arc<dyn Trainer>,
        prompt: Arc<dyn UserPrompt>,
    ) -> Self {
        Self {
            predictor,
            trainer,
            prompt,
            gaze_source: None,
            window_source: None,
            capture_system_input: false,
        }
    }

    pub fn with_gaze_source(mut self, source: Box<dyn GazeSource>) -> Self {
        self.gaze_source = Some(source);
        self
    }

    pub fn with_window_source(mut self, source: Box<dyn ActiveWindowSource>) -> Self {
        self.window_source = Some(source);
        self
    }

    pub fn with_system_input(mut self, enabled: bool) -> Self {
        self.capture_system_input = enabled;
        self
    }
}

/// What `stop` did with the data captured during the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Events drained into the log during shutdown.
    pub flushed_events: usize,
    /// Log length handed to the trainer (0 if retraining was skipped).
    pub log_events: usize,
    pub retrained: bool,
}

/// Worker threads, and the pollers parked between runs.
#[derive(Default)]
struct Workers {
    started: bool,
    window: Option<WindowWatcher>,
    gaze: Option<GazeSampler>,
    flush_handle: Option<JoinHandle<()>>,
    survey_handle: Option<JoinHandle<()>>,
    window_handle: Option<JoinHandle<WindowWatcher>>,
    gaze_handle: Option<JoinHandle<GazeSampler>>,
    #[cfg(windows)]
    listener: Option<crate::monitor::InputListener>,
}

pub struct ActivityMonitor {
    ctx: MonitorContext,
    keyboard: Arc<KeyboardSessionAggregator>,
    mouse: Arc<MouseEventCoalescer>,
    predictor: Arc<dyn Predictor>,
    trainer: Arc<dyn Trainer>,
    prompt: Arc<dyn UserPrompt>,
    intervention: Arc<InterventionTrigger>,
    capture_system_input: bool,
    workers: Mutex<Workers>,
}

impl ActivityMonitor {
    pub fn new(ctx: MonitorContext, collaborators: Collaborators) -> Self {
        let Collaborators {
            predictor,
            trainer,
            prompt,
            gaze_source,
            window_source,
            capture_system_input,
        } = collaborators;

        let keyboard = Arc::new(KeyboardSessionAggregator::new(
            Arc::clone(&ctx.queue),
            ctx.state.keyboard_activity_flag(),
            ctx.config.keyboard_session_timeout,
        ));
        let mouse = Arc::new(MouseEventCoalescer::new(
            Arc::clone(&ctx.queue),
            ctx.config.mouse_move_throttle,
        ));
        let intervention = Arc::new(InterventionTrigger::new(Arc::clone(&prompt), ctx.clone()));

        let workers = Workers {
            window: window_source.map(|s| WindowWatcher::new(s, Arc::clone(&ctx.queue))),
            gaze: gaze_source.map(|s| GazeSampler::new(s, Arc::clone(&ctx.queue))),
            ..Workers::default()
        };

        Self {
            ctx,
            keyboard,
            mouse,
            predictor,
            trainer,
            prompt,
            intervention,
            capture_system_input,
            workers: Mutex::new(workers),
        }
    }

    fn workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    /// Raw input entry points for this monitor.
    pub fn input(&self) -> InputHandle {
        InputHandle::new(
            Arc::clone(&self.keyboard),
            Arc::clone(&self.mouse),
            self.ctx.run_flag().clone(),
        )
    }

    pub fn intervention(&self) -> &InterventionTrigger {
        &self.intervention
    }

    pub fn is_running(&self) -> bool {
        self.ctx.state.is_running()
    }

    /// Starts every producer and consumer.
    ///
    /// On failure everything already started is stopped again (without
    /// retraining) and the error is returned.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers();
        if workers.started {
            return Err(MonitorError::AlreadyRunning);
        }

        self.ctx.state.reset(self.ctx.config.survey_initial_delay);
        self.ctx.run_flag().start();
        workers.started = true;

        if let Err(e) = self.spawn_workers(&mut workers) {
            tracing::error!(error = %e, "Monitor failed to start, rolling back");
            self.halt(&mut workers);
            workers.started = false;
            return Err(e);
        }

        tracing::info!(
            data_dir = %self.ctx.config.data_dir.display(),
            flush_secs = self.ctx.config.flush_interval.as_secs(),
            "Activity monitor started"
        );
        Ok(())
    }

    fn spawn_workers(&self, workers: &mut Workers) -> Result<()> {
        let config = &self.ctx.config;
        let run = self.ctx.run_flag().clone();

        self.keyboard.start()?;

        workers.flush_handle = Some(spawn_flush_cycle(FlushPredictCycle::new(
            self.ctx.clone(),
            Arc::clone(&self.predictor),
            Arc::clone(&self.intervention),
        ))?);

        workers.survey_handle = Some(spawn_survey_scheduler(FocusSurveyScheduler::new(
            self.ctx.clone(),
            Arc::clone(&self.prompt),
        ))?);

        if let Some(watcher) = workers.window.take() {
            let poller = PollerConfig {
                poll_interval: config.window_poll_interval,
            };
            workers.window_handle = Some(spawn_window_watcher(watcher, run.clone(), poller)?);
        }

        if let Some(sampler) = workers.gaze.take() {
            workers.gaze_handle =
                Some(spawn_gaze_sampler(sampler, run.clone(), config.gaze_poll_interval)?);
        }

        if self.capture_system_input {
            self.spawn_listener(workers, run)?;
        }

        Ok(())
    }

    #[cfg(windows)]
    fn spawn_listener(&self, workers: &mut Workers, run: super::state::RunFlag) -> Result<()> {
        workers.listener = Some(crate::monitor::spawn_input_listener(self.input(), run)?);
        Ok(())
    }

    #[cfg(not(windows))]
    fn spawn_listener(&self, _workers: &mut Workers, _run: super::state::RunFlag) -> Result<()> {
        tracing::warn!("System-wide input capture is not supported on this platform");
        Ok(())
    }

    /// Stops the loops and releases the listeners, then closes the open
    /// keyboard session. Pollers are parked for the next start.
    fn halt(&self, workers: &mut Workers) {
        self.ctx.run_flag().stop();

        #[cfg(windows)]
        if let Some(listener) = workers.listener.take() {
            listener.stop();
        }

        for (name, handle) in [
            ("flush cycle", workers.flush_handle.take()),
            ("focus survey", workers.survey_handle.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    tracing::error!(thread = name, "Worker thread panicked");
                }
            }
        }

        if let Some(handle) = workers.window_handle.take() {
            match handle.join() {
                Ok(watcher) => workers.window = Some(watcher),
                Err(_) => tracing::error!("Window watcher thread panicked"),
            }
        }
        if let Some(handle) = workers.gaze_handle.take() {
            match handle.join() {
                Ok(sampler) => workers.gaze = Some(sampler),
                Err(_) => tracing::error!("Gaze sampler thread panicked"),
            }
        }

        self.keyboard.stop();
        self.mouse.reset();
    }

    /// Stops monitoring, persists what is left in the queue and retrains.
    ///
    /// Calling it when not started is a no-op. A retrain failure is logged
    /// and the log is kept for the next run.
    pub fn stop(&self) -> ShutdownReport {
        let mut workers = self.workers();
        if !workers.started {
            return ShutdownReport::default();
        }

        tracing::info!("Stopping activity monitor");
        self.halt(&mut workers);
        workers.started = false;
        drop(workers);

        let mut report = ShutdownReport {
            flushed_events: flush_to_log(&self.ctx).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to flush remaining events");
                0
            }),
            ..ShutdownReport::default()
        };

        let log = match self.ctx.log.events() {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted log, skipping retrain");
                return report;
            }
        };
        if log.is_empty() {
            tracing::info!("Persisted log is empty, skipping retrain");
            return report;
        }

        report.log_events = log.len();
        tracing::info!(events = log.len(), "Retraining focus model");
        match self.trainer.retrain(&log) {
            Ok(()) => {
                report.retrained = true;
                if let Err(e) = self.ctx.log.truncate() {
                    tracing::warn!(error = %e, "Failed to truncate persisted log");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Retraining failed, keeping log"),
        }

        report
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        if self.workers().started {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{PromptOutcome, PromptReply};
    use crate::error::CollaboratorError;
    use crate::monitor::MouseButton;
    use crate::settings::MonitorConfig;
    use crate::store::{Event, EventKind, GazeSample};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct ConstantPredictor(f64);

    impl Predictor for ConstantPredictor {
        fn predict(&self, _batch: &[Event]) -> std::result::Result<f64, CollaboratorError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingTrainer {
        fail: bool,
        seen: Mutex<Vec<Vec<EventKind>>>,
    }

    impl Trainer for RecordingTrainer {
        fn retrain(&self, log: &[Event]) -> std::result::Result<(), CollaboratorError> {
            self.seen
                .lock()
                .unwrap()
                .push(log.iter().map(Event::kind).collect());
            if self.fail {
                Err(CollaboratorError::TrainingError("no labels".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct SilentPrompt;

    impl UserPrompt for SilentPrompt {
        fn request_focus_level(&self) -> PromptReply {
            PromptReply::ready(PromptOutcome::Dismissed)
        }

        fn show_alert(&self, _title: &str, _message: &str) {}
    }

    struct StaticWindow;

    impl ActiveWindowSource for StaticWindow {
        fn active_window_title(&mut self) -> std::result::Result<Option<String>, CollaboratorError> {
            Ok(Some("Editor".to_string()))
        }
    }

    struct CountingGaze(Arc<AtomicUsize>);

    impl GazeSource for CountingGaze {
        fn sample(&mut self) -> std::result::Result<Option<GazeSample>, CollaboratorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn monitor(dir: &TempDir, trainer: Arc<RecordingTrainer>) -> ActivityMonitor {
        let config = MonitorConfig {
            data_dir: dir.path().to_path_buf(),
            flush_interval: Duration::from_secs(3600),
            window_poll_interval: Duration::from_millis(5),
            gaze_poll_interval: Duration::from_millis(5),
            ..MonitorConfig::default()
        };
        let collaborators = Collaborators::new(
            Arc::new(ConstantPredictor(0.9)),
            trainer,
            Arc::new(SilentPrompt),
        )
        .with_window_source(Box::new(StaticWindow));
        ActivityMonitor::new(MonitorContext::new(config), collaborators)
    }

    #[test]
    fn test_stop_flushes_and_retrains() {
        let dir = TempDir::new().unwrap();
        let trainer = Arc::new(RecordingTrainer::default());
        let monitor = monitor(&dir, Arc::clone(&trainer));

        monitor.start().unwrap();
        let input = monitor.input();
        input.key_pressed();
        input.mouse_pressed((10, 10), MouseButton::Left);
        input.mouse_released((50, 60));
        std::thread::sleep(Duration::from_millis(30));

        let report = monitor.stop();
        assert!(!monitor.is_running());
        assert!(report.retrained);
        assert_eq!(report.flushed_events, report.log_events);

        let seen = trainer.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let kinds = &seen[0];
        assert!(kinds.contains(&EventKind::KeyboardSession));
        assert!(kinds.contains(&EventKind::MouseClick));
        assert!(kinds.contains(&EventKind::MouseMovement));
        assert!(kinds.contains(&EventKind::WindowActivity));

        assert!(monitor.context().log.events().unwrap().is_empty());
    }

    #[test]
    fn test_retrain_failure_keeps_log() {
        let dir = TempDir::new().unwrap();
        let trainer = Arc::new(RecordingTrainer {
            fail: true,
            ..RecordingTrainer::default()
        });
        let monitor = monitor(&dir, trainer);

        monitor.start().unwrap();
        monitor.input().key_pressed();
        let report = monitor.stop();

        assert!(!report.retrained);
        assert!(report.log_events >= 1);
        assert_eq!(
            monitor.context().log.events().unwrap().len(),
            report.log_events
        );
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir, Arc::new(RecordingTrainer::default()));

        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));
        monitor.stop();
        assert_eq!(monitor.stop(), ShutdownReport::default());
    }

    #[test]
    fn test_input_after_stop_is_dropped() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir, Arc::new(RecordingTrainer::default()));
        let input = monitor.input();

        monitor.start().unwrap();
        monitor.stop();

        input.key_pressed();
        input.mouse_pressed((1, 1), MouseButton::Left);
        input.mouse_released((9, 9));

        assert!(!monitor.context().state.keyboard_session_active());
        assert!(monitor.context().queue.is_empty());
    }

    #[test]
    fn test_empty_run_skips_retrain() {
        let dir = TempDir::new().unwrap();
        let trainer = Arc::new(RecordingTrainer::default());
        let config = MonitorConfig {
            data_dir: dir.path().to_path_buf(),
            ..MonitorConfig::default()
        };
        let monitor = ActivityMonitor::new(
            MonitorContext::new(config),
            Collaborators::new(
                Arc::new(ConstantPredictor(0.9)),
                Arc::clone(&trainer) as Arc<dyn Trainer>,
                Arc::new(SilentPrompt),
            ),
        );

        monitor.start().unwrap();
        let report = monitor.stop();

        assert_eq!(report, ShutdownReport::default());
        assert!(trainer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_pollers_restart_after_stop() {
        let dir = TempDir::new().unwrap();
        let samples = Arc::new(AtomicUsize::new(0));
        let config = MonitorConfig {
            data_dir: dir.path().to_path_buf(),
            gaze_poll_interval: Duration::from_millis(2),
            ..MonitorConfig::default()
        };
        let monitor = ActivityMonitor::new(
            MonitorContext::new(config),
            Collaborators::new(
                Arc::new(ConstantPredictor(0.9)),
                Arc::new(RecordingTrainer::default()),
                Arc::new(SilentPrompt),
            )
            .with_gaze_source(Box::new(CountingGaze(Arc::clone(&samples)))),
        );

        monitor.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        monitor.stop();
        let first_run = samples.load(Ordering::SeqCst);
        assert!(first_run > 0);

        monitor.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        monitor.stop();
        assert!(samples.load(Ordering::SeqCst) > first_run);
    }
}
