//! Adaptive-interval focus survey.
//!
//! Asks the user to self-report a focus level: first after the initial
//! delay, then once per regular interval, never while a keyboard session is
//! open, and at most `survey_max_sessions` times per run.

use super::flush_cycle::flush_to_log;
use super::state::MonitorContext;
use crate::collaborators::{PromptOutcome, UserPrompt};
use crate::error::{MonitorError, Result};
use crate::store::EventPayload;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Highest level on the self-report scale.
pub const MAX_FOCUS_LEVEL: u8 = 10;

#[derive(Debug, Serialize)]
struct SurveyUpdate {
    level: u8,
    focus_session_count: u32,
}

pub struct FocusSurveyScheduler {
    ctx: MonitorContext,
    prompt: Arc<dyn UserPrompt>,
}

impl FocusSurveyScheduler {
    pub fn new(ctx: MonitorContext, prompt: Arc<dyn UserPrompt>) -> Self {
        Self { ctx, prompt }
    }

    /// Runs until the monitor stops or the survey cap is reached.
    pub fn run(&self) {
        let config = &self.ctx.config;
        let state = &self.ctx.state;
        let run = self.ctx.run_flag();

        tracing::info!(
            first_in_secs = state.survey_due_in().as_secs(),
            max_sessions = config.survey_max_sessions,
            "Focus survey loop started"
        );

        while run.is_running() {
            if state.focus_session_count() >= config.survey_max_sessions {
                tracing::info!(
                    count = state.focus_session_count(),
                    "Focus survey cap reached, no further prompts this run"
                );
                break;
            }

            let due_in = state.survey_due_in();
            if !due_in.is_zero() {
                if !run.sleep(due_in.min(config.survey_check_interval)) {
                    break;
                }
                continue;
            }

            // Never interrupt active typing.
            if state.keyboard_session_active() {
                if !run.sleep(config.typing_poll_interval) {
                    break;
                }
                continue;
            }

            match self.ask() {
                Some(outcome) => {
                    self.record(outcome);
                }
                None => break,
            }
        }

        tracing::info!("Focus survey loop stopped");
    }

    /// Shows the prompt and waits for the answer, checking the run flag
    /// between waits. Returns `None` if the monitor stopped first.
    fn ask(&self) -> Option<PromptOutcome> {
        tracing::debug!("Requesting focus level");
        let reply = self.prompt.request_focus_level();
        let step = self.ctx.config.typing_poll_interval;
        loop {
            if let Some(outcome) = reply.wait(step) {
                return Some(outcome);
            }
            if !self.ctx.state.is_running() {
                tracing::debug!("Monitor stopped while survey pending");
                return None;
            }
        }
    }

    /// Applies a survey outcome. Returns the logged level, if any.
    pub fn record(&self, outcome: PromptOutcome) -> Option<u8> {
        let state = &self.ctx.state;
        let interval = self.ctx.config.survey_interval;

        match outcome {
            PromptOutcome::Submitted(level) => {
                let level = level.min(MAX_FOCUS_LEVEL);
                self.ctx.queue.enqueue(EventPayload::FocusQuery { level });
                state.record_survey(Instant::now(), interval, true);

                if let Err(e) = flush_to_log(&self.ctx) {
                    tracing::warn!(error = %e, "Failed to flush after focus report");
                }

                let focus_session_count = state.focus_session_count();
                tracing::info!(level, count = focus_session_count, "Focus level recorded");
                self.ctx.broadcast(
                    "survey",
                    &SurveyUpdate {
                        level,
                        focus_session_count,
                    },
                );
                Some(level)
            }
            PromptOutcome::Dismissed => {
                state.record_survey(Instant::now(), interval, false);
                tracing::info!("Focus survey dismissed");
                None
            }
        }
    }
}

pub fn spawn_survey_scheduler(scheduler: FocusSurveyScheduler) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("focus-survey".to_string())
        .spawn(move || scheduler.run())
        .map_err(|source| MonitorError::Spawn {
            name: "focus survey",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PromptReply;
    use crate::settings::MonitorConfig;
    use crate::store::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedPrompt {
        outcome: PromptOutcome,
        requests: AtomicUsize,
    }

    impl FixedPrompt {
        fn new(outcome: PromptOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                requests: AtomicUsize::new(0),
            })
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl UserPrompt for FixedPrompt {
        fn request_focus_level(&self) -> PromptReply {
            self.requests.fetch_add(1, Ordering::SeqCst);
            PromptReply::ready(self.outcome)
        }

        fn show_alert(&self, _title: &str, _message: &str) {}
    }

    fn fast_context(dir: &TempDir) -> MonitorContext {
        let config = MonitorConfig {
            data_dir: dir.path().to_path_buf(),
            survey_initial_delay: Duration::from_millis(1),
            survey_interval: Duration::from_millis(1),
            survey_check_interval: Duration::from_millis(1),
            typing_poll_interval: Duration::from_millis(2),
            ..MonitorConfig::default()
        };
        let ctx = MonitorContext::new(config);
        ctx.state.reset(ctx.config.survey_initial_delay);
        ctx.run_flag().start();
        ctx
    }

    fn focus_levels(events: &[Event]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e.payload {
                EventPayload::FocusQuery { level } => Some(level),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_stops_prompting_after_cap() {
        let dir = TempDir::new().unwrap();
        let ctx = fast_context(&dir);
        let prompt = FixedPrompt::new(PromptOutcome::Submitted(7));

        let handle =
            spawn_survey_scheduler(FocusSurveyScheduler::new(ctx.clone(), prompt.clone())).unwrap();

        // The loop exits on its own once the cap is reached.
        handle.join().unwrap();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(prompt.requests(), 15);
        assert_eq!(ctx.state.focus_session_count(), 15);
        assert!(ctx.state.is_running());

        let levels = focus_levels(&ctx.log.events().unwrap());
        assert_eq!(levels, vec![7; 15]);
        ctx.run_flag().stop();
    }

    #[test]
    fn test_waits_for_typing_to_stop() {
        let dir = TempDir::new().unwrap();
        let ctx = fast_context(&dir);
        let prompt = FixedPrompt::new(PromptOutcome::Dismissed);
        let typing = ctx.state.keyboard_activity_flag();
        typing.store(true, Ordering::SeqCst);

        let handle =
            spawn_survey_scheduler(FocusSurveyScheduler::new(ctx.clone(), prompt.clone())).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(prompt.requests(), 0);

        typing.store(false, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        ctx.run_flag().stop();
        handle.join().unwrap();

        assert!(prompt.requests() > 0);
        // Dismissals reschedule without counting.
        assert_eq!(ctx.state.focus_session_count(), 0);
    }

    #[test]
    fn test_submission_clamps_level_and_flushes() {
        let dir = TempDir::new().unwrap();
        let ctx = fast_context(&dir);
        let scheduler = FocusSurveyScheduler::new(ctx.clone(), FixedPrompt::new(PromptOutcome::Dismissed));

        ctx.queue.enqueue(EventPayload::WindowActivity {
            title: "Editor".to_string(),
        });
        assert_eq!(scheduler.record(PromptOutcome::Submitted(42)), Some(10));

        assert!(ctx.queue.is_empty());
        let events = ctx.log.events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(focus_levels(&events), vec![10]);
        assert_eq!(ctx.state.focus_session_count(), 1);
        assert_eq!(ctx.state.next_survey_interval(), Duration::from_millis(1));
        ctx.run_flag().stop();
    }

    #[test]
    fn test_pending_prompt_abandoned_on_stop() {
        struct NeverAnswers;

        impl UserPrompt for NeverAnswers {
            fn request_focus_level(&self) -> PromptReply {
                let (responder, reply) = PromptReply::channel();
                // Keep the responder alive so the reply stays pending.
                std::mem::forget(responder);
                reply
            }

            fn show_alert(&self, _title: &str, _message: &str) {}
        }

        let dir = TempDir::new().unwrap();
        let ctx = fast_context(&dir);
        let handle =
            spawn_survey_scheduler(FocusSurveyScheduler::new(ctx.clone(), Arc::new(NeverAnswers)))
                .unwrap();

        thread::sleep(Duration::from_millis(20));
        ctx.run_flag().stop();
        handle.join().unwrap();
        assert_eq!(ctx.state.focus_session_count(), 0);
    }
}
