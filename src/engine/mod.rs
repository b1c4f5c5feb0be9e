//! Periodic consumers and lifecycle.
//!
//! The flush/predict cycle, the focus survey and the intervention alert all
//! run against one [`MonitorContext`]; [`ActivityMonitor`] starts and stops
//! them together with the producers.

pub mod flush_cycle;
pub mod intervention;
pub mod lifecycle;
pub mod state;
pub mod survey;

pub use flush_cycle::{spawn_flush_cycle, CycleReport, FlushPredictCycle};
pub use intervention::InterventionTrigger;
pub use lifecycle::{ActivityMonitor, Collaborators, ShutdownReport};
pub use state::{MonitorContext, MonitorState, RunFlag, StatusSnapshot};
pub use survey::{spawn_survey_scheduler, FocusSurveyScheduler};
