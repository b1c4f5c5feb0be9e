//! Data types for captured activity.
//!
//! Defines the event record every producer pushes into the queue, and
//! the payload variants for each kind of activity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pointer position in screen pixels.
pub type ScreenPosition = (i32, i32);

/// Gaze position in screen coordinates (sub-pixel).
pub type GazePosition = (f64, f64);

/// Discriminant of an [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    KeyboardSession,
    MouseClick,
    MouseMovement,
    #[serde(rename = "active_window")]
    WindowActivity,
    #[serde(rename = "gaze_data")]
    GazeSample,
    #[serde(rename = "focus_level")]
    FocusQuery,
}

impl EventKind {
    /// Wire name of this kind, as written to the persisted log.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::KeyboardSession => "keyboard_session",
            EventKind::MouseClick => "mouse_click",
            EventKind::MouseMovement => "mouse_movement",
            EventKind::WindowActivity => "active_window",
            EventKind::GazeSample => "gaze_data",
            EventKind::FocusQuery => "focus_level",
        }
    }
}

/// A coalesced run of keystrokes with gaps shorter than the idle timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardSession {
    #[serde(rename = "start_time")]
    pub start: DateTime<Utc>,

    /// Time of the last keypress in the session.
    #[serde(rename = "end_time")]
    pub end: DateTime<Utc>,

    /// Always at least 1.
    #[serde(rename = "key_strokes")]
    pub keystroke_count: u32,
}

impl KeyboardSession {
    pub fn duration_ms(&self) -> i64 {
        (self.end - self.start).num_milliseconds().max(0)
    }
}

/// A press followed by a release, reduced to its two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseMovement {
    pub start_position: ScreenPosition,
    pub end_position: ScreenPosition,
}

/// One successful gaze estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    #[serde(rename = "gaze_start_position")]
    pub raw_position: GazePosition,

    /// Position after the per-user calibration adjustment.
    #[serde(rename = "adjusted_gaze_start_position")]
    pub adjusted_position: GazePosition,
}

/// Event body, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    KeyboardSession(KeyboardSession),
    MouseClick {
        position: ScreenPosition,
        button: String,
    },
    MouseMovement(MouseMovement),
    #[serde(rename = "active_window")]
    WindowActivity { title: String },
    #[serde(rename = "gaze_data")]
    GazeSample(GazeSample),
    #[serde(rename = "focus_level")]
    FocusQuery { level: u8 },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::KeyboardSession(_) => EventKind::KeyboardSession,
            EventPayload::MouseClick { .. } => EventKind::MouseClick,
            EventPayload::MouseMovement(_) => EventKind::MouseMovement,
            EventPayload::WindowActivity { .. } => EventKind::WindowActivity,
            EventPayload::GazeSample(_) => EventKind::GazeSample,
            EventPayload::FocusQuery { .. } => EventKind::FocusQuery,
        }
    }
}

/// A single timestamped entry in the activity log.
///
/// Serialized as `{"timestamp", "type", "data", "time_delta"}` where
/// `time_delta` is the gap in seconds since the previously enqueued event
/// (`null` for the first event of a run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub payload: EventPayload,

    #[serde(default, with = "delta_secs")]
    pub time_delta: Option<Duration>,
}

impl Event {
    /// Creates an event with no predecessor.
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            timestamp,
            payload,
            time_delta: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Body of the event as a standalone JSON value (the `data` field).
    pub fn data_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.payload)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Ordered events drained from the queue in one operation.
pub type Batch = Vec<Event>;

/// `Option<Duration>` as fractional seconds.
mod delta_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value
            .map(|d| match d.num_microseconds() {
                Some(us) => us as f64 / 1_000_000.0,
                None => d.num_milliseconds() as f64 / 1_000.0,
            })
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.map(|s| Duration::microseconds((s * 1_000_000.0).round() as i64)))
    }
}
