//! Trainer that exports labelled sessions for offline model training.

use super::features::{label_sessions, truncate_sequence, LabelledSession, SEQUENCE_LENGTH};
use crate::collaborators::Trainer;
use crate::error::CollaboratorError;
use crate::store::{append_json_array, Event};
use std::path::{Path, PathBuf};

pub const DATASET_FILE_NAME: &str = "training_sessions.json";

/// Appends every labelled session of the log to a JSON dataset document.
#[derive(Debug, Clone)]
pub struct DatasetTrainer {
    path: PathBuf,
    label_threshold: u8,
    sequence_length: usize,
}

impl DatasetTrainer {
    /// Writes `training_sessions.json` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>, label_threshold: u8) -> Self {
        Self {
            path: data_dir.as_ref().join(DATASET_FILE_NAME),
            label_threshold,
            sequence_length: SEQUENCE_LENGTH,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Trainer for DatasetTrainer {
    fn retrain(&self, log: &[Event]) -> Result<(), CollaboratorError> {
        let sessions: Vec<LabelledSession> = label_sessions(log, self.label_threshold)
            .into_iter()
            .map(|session| LabelledSession {
                rows: truncate_sequence(&session.rows, self.sequence_length).to_vec(),
                ..session
            })
            .collect();

        if sessions.is_empty() {
            return Err(CollaboratorError::TrainingError(
                "log contains no labelled sessions".to_string(),
            ));
        }

        let focused = sessions.iter().filter(|s| s.label == 1).count();
        let total = append_json_array(&self.path, &sessions)
            .map_err(|e| CollaboratorError::TrainingError(e.to_string()))?;

        tracing::info!(
            sessions = sessions.len(),
            focused,
            dataset_size = total,
            path = %self.path.display(),
            "Exported labelled sessions"
        );
        Ok(())
    }
}
