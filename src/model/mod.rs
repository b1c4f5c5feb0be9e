//! Built-in focus model collaborators.
//!
//! A heuristic [`BaselinePredictor`] and a [`DatasetTrainer`] that turns the
//! persisted log into labelled training sessions.

pub mod baseline;
pub mod dataset;
pub mod features;

pub use baseline::{BaselinePredictor, BaselineWeights};
pub use dataset::{DatasetTrainer, DATASET_FILE_NAME};
pub use features::*;
