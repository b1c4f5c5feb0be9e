//! Training rows and focus-report labelling.
//!
//! The persisted log is cut into sessions at every `focus_level` report;
//! each session's rows are labelled by the level that closed it.

use crate::store::{Event, EventKind, EventPayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rows kept per session; older rows are dropped first.
pub const SEQUENCE_LENGTH: usize = 100;

/// Levels above this mark a session as focused.
pub const DEFAULT_LABEL_THRESHOLD: u8 = 5;

/// One event reduced to model features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    /// Screen position, or `[duration_ms, 0]` for keyboard sessions.
    pub position: [f64; 2],
    pub button: Option<String>,
    /// Seconds since the previous event (0 for the first).
    pub time_delta: f64,
}

/// Rows between two focus reports, labelled by the closing report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledSession {
    pub level: u8,
    /// 1 if focused, 0 otherwise.
    pub label: u8,
    pub rows: Vec<FeatureRow>,
}

/// Builds the feature row for `event`.
///
/// Window changes and focus reports carry no position and yield `None`.
pub fn feature_row(event: &Event) -> Option<FeatureRow> {
    let (position, button) = match &event.payload {
        EventPayload::GazeSample(sample) => {
            let (x, y) = sample.adjusted_position;
            ([x, y], None)
        }
        EventPayload::MouseMovement(movement) => {
            let (sx, sy) = movement.start_position;
            let (ex, ey) = movement.end_position;
            (
                [
                    f64::from(sx + ex) / 2.0,
                    f64::from(sy + ey) / 2.0,
                ],
                None,
            )
        }
        EventPayload::MouseClick { position, button } => (
            [f64::from(position.0), f64::from(position.1)],
            Some(button.clone()),
        ),
        EventPayload::KeyboardSession(session) => ([session.duration_ms() as f64, 0.0], None),
        EventPayload::WindowActivity { .. } | EventPayload::FocusQuery { .. } => return None,
    };

    let time_delta = event
        .time_delta
        .and_then(|d| d.to_std().ok())
        .map_or(0.0, |d| d.as_secs_f64());

    Some(FeatureRow {
        timestamp: event.timestamp,
        event_type: event.kind(),
        position,
        button,
        time_delta,
    })
}

/// Splits the log into labelled sessions.
///
/// Empty sessions and trailing rows with no closing report are skipped.
pub fn label_sessions(log: &[Event], threshold: u8) -> Vec<LabelledSession> {
    let mut sessions = Vec::new();
    let mut rows = Vec::new();

    for event in log {
        match &event.payload {
            EventPayload::FocusQuery { level } => {
                let rows = std::mem::take(&mut rows);
                if rows.is_empty() {
                    continue;
                }
                sessions.push(LabelledSession {
                    level: *level,
                    label: u8::from(*level > threshold),
                    rows,
                });
            }
            _ => rows.extend(feature_row(event)),
        }
    }

    if !rows.is_empty() {
        tracing::debug!(rows = rows.len(), "Skipping unlabelled trailing rows");
    }
    sessions
}

/// Keeps the most recent `max_len` rows.
pub fn truncate_sequence(rows: &[FeatureRow], max_len: usize) -> &[FeatureRow] {
    &rows[rows.len().saturating_sub(max_len)..]
}
