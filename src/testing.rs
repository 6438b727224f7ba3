//! Shared fixtures for unit tests.

use std::sync::Arc;

use subflow_runner::{FailureInjection, RunnerConfig, RunnerState};

use crate::executor::TransitionExecutor;
use crate::guard::{Actor, StaticScopes};
use crate::notify::RecordingNotifier;
use crate::store::{MemoryActivityLog, MemoryStore, SubmissionVersion, VersionStore};
use crate::workflow::builtin::{self, SCOPE_EDITOR, SCOPE_PUBLISH};
use crate::workflow::RegistryBuilder;

pub const PREPRINTS: &str = "preprints";
pub const JOURNAL: &str = "journal";

pub struct Harness {
    pub executor: TransitionExecutor,
    pub store: Arc<MemoryStore>,
    pub activity: Arc<MemoryActivityLog>,
    pub runner: RunnerState,
    pub notifier: RecordingNotifier,
}

impl Harness {
    /// Jobs stay RUNNING until the test sets their status.
    pub fn new() -> Self {
        let runner = RunnerState::new(RunnerConfig::default());
        runner.set_failure_injection(FailureInjection {
            hold_jobs: true,
            ..Default::default()
        });
        Self::with_runner(runner)
    }

    pub fn with_runner(runner: RunnerState) -> Self {
        let registry = RegistryBuilder::with_builtins()
            .assign(PREPRINTS, builtin::SIMPLE)
            .assign(JOURNAL, builtin::DEFAULT)
            .build_strict()
            .unwrap();
        let activity = Arc::new(MemoryActivityLog::new());
        let store = Arc::new(MemoryStore::with_activity_log(activity.clone()));
        let scopes = StaticScopes::new()
            .grant("editor", JOURNAL, SCOPE_EDITOR)
            .grant("editor", JOURNAL, SCOPE_PUBLISH)
            .admin("root");
        let notifier = RecordingNotifier::new();
        let executor = TransitionExecutor::new(
            Arc::new(registry),
            store.clone(),
            Arc::new(scopes),
            Arc::new(notifier.clone()),
            Arc::new(runner.clone()),
        );
        Self {
            executor,
            store,
            activity,
            runner,
            notifier,
        }
    }

    pub fn version(&self, venue: &str) -> SubmissionVersion {
        self.executor.create_version("sub-1", venue).unwrap()
    }

    pub fn reload(&self, version: &SubmissionVersion) -> SubmissionVersion {
        self.store.get(&version.id).unwrap()
    }
}

pub fn author() -> Actor {
    Actor::new("author")
}

pub fn editor() -> Actor {
    Actor::new("editor")
}
