//! Subflow - submission workflow engine
//!
//! Moves submission versions through venue-specific workflows: a registry
//! of validated state graphs, a resolver and scope guard, an executor that
//! applies transitions under optimistic concurrency, a job-linked protocol
//! for transitions that wait on a background job, and the client-side
//! reconciliation state that overlays hoped-for status on confirmed status.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod linked;
pub mod notify;
pub mod poller;
pub mod reconcile;
pub mod resolve;
pub mod runner;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use api::{dispatch, TransitionApi};
pub use config::{ConfigError, EffectiveConfig, EngineConfig};
pub use error::EngineError;
pub use executor::{ExecuteOptions, FinalizeOutcome, TransitionExecutor, TransitionOutcome};
pub use guard::{is_allowed, Actor, ScopeChecker, StaticScopes};
pub use linked::{JobLinkedDriver, LinkedOutcome, LinkedPhase, LinkedTransition};
pub use notify::{LogNotifier, Notifier, RecordingNotifier};
pub use poller::{CancellationToken, JobPoller, PollBudget, PollerConfig};
pub use reconcile::{ClientDisplayState, ClientSession};
pub use resolve::{resolve, Resolution};
pub use runner::{JobRunner, JobRunnerError};
pub use store::{MemoryActivityLog, MemoryStore, SubmissionVersion, VersionStore};
pub use workflow::{RegistryBuilder, State, Transition, Workflow, WorkflowRegistry};
