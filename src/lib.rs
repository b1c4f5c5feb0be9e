//! FocusMon - desktop activity capture and focus feedback.
//!
//! Producers (keyboard sessions, mouse movements, window changes, gaze
//! samples, focus surveys) feed one ordered [`store::EventQueue`]. A
//! fixed-interval cycle drains it into a persisted JSON log, scores each
//! batch with a pluggable [`collaborators::Predictor`] and raises an alert
//! after sustained unfocus. On shutdown the log is handed to a
//! [`collaborators::Trainer`].

pub mod backend;
pub mod collaborators;
pub mod engine;
pub mod error;
pub mod model;
pub mod monitor;
pub mod prompt;
pub mod server;
pub mod settings;
pub mod store;

#[cfg(windows)]
pub mod winapi_utils;

pub use engine::{ActivityMonitor, Collaborators, MonitorContext};
pub use error::{CollaboratorError, MonitorError, Result};
pub use settings::MonitorConfig;
