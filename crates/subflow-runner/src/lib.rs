//! Subflow Simulated Job Runner
//!
//! An in-process stand-in for the external job runner that executes
//! long-running side effects (rendering, publishing) for job-linked
//! transitions. Jobs advance through scheduled status changes so callers
//! observe them the same way they would a remote runner: by polling.
//!
//! Used by integration tests and the `subflow simulate` command.

pub mod config;
pub mod state;

pub use config::RunnerConfig;
pub use state::{FailureInjection, RunnerError, RunnerJob, RunnerState, ScheduledTransition};
