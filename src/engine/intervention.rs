//! Sustained-unfocus alert.

use super::state::MonitorContext;
use crate::collaborators::UserPrompt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const ALERT_TITLE: &str = "Focus check";
pub const ALERT_MESSAGE: &str = "You seem distracted. Try to refocus on your task.";

#[derive(Debug, Serialize)]
struct InterventionUpdate {
    unfocused_secs: u64,
    count: u64,
}

/// Surfaces the unfocus alert. Has no effect on any producer or consumer.
pub struct InterventionTrigger {
    prompt: Arc<dyn UserPrompt>,
    ctx: MonitorContext,
    fired: AtomicU64,
}

impl InterventionTrigger {
    pub fn new(prompt: Arc<dyn UserPrompt>, ctx: MonitorContext) -> Self {
        Self {
            prompt,
            ctx,
            fired: AtomicU64::new(0),
        }
    }

    pub fn fire(&self) {
        let count = self.fired.fetch_add(1, Ordering::SeqCst) + 1;
        let unfocused_secs = self.ctx.state.unfocused_duration().as_secs();
        tracing::info!(unfocused_secs, count, "Sustained unfocus, showing intervention");

        self.prompt.show_alert(ALERT_TITLE, ALERT_MESSAGE);
        self.ctx.broadcast(
            "intervention",
            &InterventionUpdate {
                unfocused_secs,
                count,
            },
        );
    }

    /// Number of alerts shown this process lifetime.
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{PromptOutcome, PromptReply};
    use crate::settings::MonitorConfig;
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct RecordingPrompt {
        alerts: Mutex<Vec<(String, String)>>,
    }

    impl UserPrompt for RecordingPrompt {
        fn request_focus_level(&self) -> PromptReply {
            PromptReply::ready(PromptOutcome::Dismissed)
        }

        fn show_alert(&self, title: &str, message: &str) {
            self.alerts
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string()));
        }
    }

    #[test]
    fn test_fire_shows_alert_and_broadcasts() {
        let prompt = Arc::new(RecordingPrompt::default());
        let mut ctx = MonitorContext::new(MonitorConfig::default());
        let (tx, mut rx) = broadcast::channel(4);
        ctx.broadcast_tx = Some(tx);

        let trigger = InterventionTrigger::new(prompt.clone(), ctx);
        trigger.fire();
        trigger.fire();

        assert_eq!(trigger.fired_count(), 2);
        let alerts = prompt.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].0, ALERT_TITLE);

        let message: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(message["type"], "intervention");
        assert_eq!(message["data"]["count"], 1);
    }
}
