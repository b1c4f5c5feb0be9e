//! Error types for the monitor engine.
//!
//! Every failure is contained at the loop that caught it; these types only
//! travel as far as that loop (or out of `start`/`stop` for lifecycle errors).

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the pluggable collaborators (predictor, trainer,
/// gaze source, active-window source).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Training failed: {0}")]
    TrainingError(String),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the monitor engine.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A polling producer could not take a sample.
    #[error("Producer failure: {0}")]
    Producer(String),

    /// Disk read/write failure on the persisted log, scratch buffer or dataset.
    #[error("Persistence failure at {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collaborator failure: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// An input hook thread died or could not be installed.
    #[error("Listener failure: {0}")]
    Listener(String),

    /// The outbound activity-log client could not be set up.
    #[error("Backend client failure: {0}")]
    Backend(String),

    #[error("Failed to bind status server on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings store failure: {0}")]
    Settings(#[from] rusqlite::Error),

    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl MonitorError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
