#![forbid(unsafe_code)]

//! Background execution engine for batch file jobs.
//!
//! A [`FileJob`] walks a [`FileSet`] on its own worker thread and hands every
//! file to a [`JobOperation`]. Callers on other threads pause, resume and
//! cancel it; per-file failures are settled through a [`DecisionMaker`]
//! without unwinding the worker; [`JobListener`]s see every state change.

pub mod alert;
pub mod decision;
pub mod error;
pub mod file_set;
pub mod job;
pub mod listeners;
pub mod operation;
pub mod progress;
mod runner;
pub mod settings;
pub mod settings_io;
pub mod state;
pub mod view;

pub use alert::{AlertKind, AlertSink, TracingAlerts};
pub use decision::{
    AutoAnswer, ChannelDecisionMaker, DEFAULT_DECISION_POLL_INTERVAL, DecisionMaker,
    DecisionOutcome, DecisionPrompt, DecisionRequest, ERROR_OUTCOMES,
};
pub use error::JobError;
pub use file_set::{CachedFile, FileHandle, FileRef, FileSet, LocalFile};
pub use job::{FileJob, JobConfig, JobId};
pub use listeners::{JobListener, ListenerRegistry};
pub use operation::JobOperation;
pub use progress::{JobProgress, ProgressTracker};
pub use settings::JobSettings;
pub use settings_io::{load_job_settings, save_job_settings, settings_path};
pub use state::{JobState, Transition};
pub use view::{DetachedView, Panel, PanelView, RefreshRequest};
