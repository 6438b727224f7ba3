//! Shared fixtures for integration tests
//!
//! - An engine wired to in-memory collaborators and the simulated runner
//! - Paths to shipped and fixture workflow definitions

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use subflow::workflow::builtin::{self, SCOPE_EDITOR, SCOPE_PUBLISH};
use subflow::{
    Actor, JobRunner, JobRunnerError, MemoryActivityLog, MemoryStore, PollerConfig, RecordingNotifier,
    RegistryBuilder, StaticScopes, SubmissionVersion, TransitionApi, TransitionExecutor, VersionStore,
};
use subflow_protocol::JobStatus;
use subflow_runner::{FailureInjection, RunnerConfig, RunnerState};

pub const PREPRINTS: &str = "preprints";
pub const JOURNAL: &str = "journal";

/// Workflows shipped with the crate.
pub fn workflows_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("workflows")
}

/// Deliberately broken or unusual workflow definitions.
pub fn fixture_workflows_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/workflows")
}

pub fn fixture_workflow(name: &str) -> PathBuf {
    fixture_workflows_dir().join(name)
}

/// An engine over in-memory collaborators.
pub struct Engine {
    pub executor: TransitionExecutor,
    pub api: TransitionApi,
    pub store: MemoryStore,
    pub activity: MemoryActivityLog,
    pub runner: RunnerState,
    pub notifier: RecordingNotifier,
}

impl Engine {
    /// `preprints` uses SIMPLE, `journal` uses DEFAULT. `editor` may review
    /// and publish in `journal`; `root` is an admin.
    pub fn new(runner: RunnerState) -> Self {
        Self::with_job_runner(runner.clone(), Arc::new(runner))
    }

    /// Like [`Engine::new`], but the executor talks to `job_runner`.
    /// `runner` is kept for setting job statuses.
    pub fn with_job_runner(runner: RunnerState, job_runner: Arc<dyn JobRunner>) -> Self {
        let registry = RegistryBuilder::with_builtins()
            .assign(PREPRINTS, builtin::SIMPLE)
            .assign(JOURNAL, builtin::DEFAULT)
            .build_strict()
            .expect("builtin registry");
        let activity = MemoryActivityLog::new();
        let store = MemoryStore::with_activity_log(Arc::new(activity.clone()));
        let scopes = StaticScopes::new()
            .grant("editor", JOURNAL, SCOPE_EDITOR)
            .grant("editor", JOURNAL, SCOPE_PUBLISH)
            .admin("root");
        let notifier = RecordingNotifier::new();
        let executor = TransitionExecutor::new(
            Arc::new(registry),
            Arc::new(store.clone()),
            Arc::new(scopes),
            Arc::new(notifier.clone()),
            job_runner,
        );
        Self {
            api: TransitionApi::new(executor.clone()),
            executor,
            store,
            activity,
            runner,
            notifier,
        }
    }

    /// Jobs stay RUNNING until the test sets their status.
    pub fn held() -> Self {
        Self::new(held_runner())
    }

    /// Jobs complete after `ms` milliseconds.
    pub fn timed(ms: u64) -> Self {
        Self::new(RunnerState::new(RunnerConfig::with_delay(Duration::from_millis(ms))))
    }

    pub fn version(&self, venue: &str) -> SubmissionVersion {
        self.executor.create_version("sub-1", venue).expect("create version")
    }

    pub fn reload(&self, version: &SubmissionVersion) -> SubmissionVersion {
        self.store.get(&version.id).expect("version exists")
    }
}

pub fn held_runner() -> RunnerState {
    let runner = RunnerState::new(RunnerConfig::default());
    runner.set_failure_injection(FailureInjection {
        hold_jobs: true,
        ..FailureInjection::default()
    });
    runner
}

/// Poller that ticks fast enough for tests.
pub fn fast_poller() -> PollerConfig {
    PollerConfig::with_interval(Duration::from_millis(5))
}

pub fn author() -> Actor {
    Actor::new("author")
}

pub fn editor() -> Actor {
    Actor::new("editor")
}

/// A runner that takes its time creating jobs.
#[derive(Clone)]
pub struct SlowRunner {
    pub inner: RunnerState,
    pub delay: Duration,
    /// Number of `create_job` calls that have started.
    pub started: Arc<AtomicUsize>,
}

impl SlowRunner {
    pub fn new(inner: RunnerState, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Block until some `create_job` call is under way.
    pub fn wait_started(&self) {
        while self.started.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl JobRunner for SlowRunner {
    fn create_job(&self, job_type: &str, payload: serde_json::Value) -> Result<String, JobRunnerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        JobRunner::create_job(&self.inner, job_type, payload)
    }

    fn job_status(&self, job_id: &str) -> Result<JobStatus, JobRunnerError> {
        JobRunner::job_status(&self.inner, job_id)
    }
}
