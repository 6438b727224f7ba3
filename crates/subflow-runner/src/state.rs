//! Simulated runner state.
//!
//! Thread-safe, in-memory job table shared between the code that creates
//! jobs and the pollers that read their status.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use subflow_protocol::{Job, JobStatus};
use tracing::debug;

use crate::config::RunnerConfig;

/// Runner errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("runner unavailable: {0}")]
    Unavailable(String),

    #[error("runner at capacity ({0} running jobs)")]
    Busy(usize),
}

impl RunnerError {
    /// Transient errors may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, RunnerError::Unavailable(_) | RunnerError::Busy(_))
    }
}

/// Thread-safe simulated runner.
#[derive(Debug, Clone)]
pub struct RunnerState {
    inner: Arc<RwLock<RunnerStateInner>>,
}

#[derive(Debug)]
struct RunnerStateInner {
    config: RunnerConfig,
    /// Jobs by id.
    jobs: HashMap<String, RunnerJob>,
    /// Failure injection configuration.
    failure_injection: FailureInjection,
    /// Status reads still to fail before reads succeed again.
    pending_status_failures: u32,
    /// Total status reads served (including failed ones).
    status_reads: u64,
    /// Counter for generating unique IDs.
    id_counter: u64,
}

/// A simulated job.
#[derive(Debug, Clone)]
pub struct RunnerJob {
    pub job: Job,
    pub payload: serde_json::Value,
    pub created_at: Instant,
    /// Scheduled status changes (simulating asynchronous execution).
    pub transitions: Vec<ScheduledTransition>,
}

/// A scheduled status change.
#[derive(Debug, Clone)]
pub struct ScheduledTransition {
    pub to_status: JobStatus,
    pub at: Instant,
}

/// Failure injection configuration.
#[derive(Debug, Clone, Default)]
pub struct FailureInjection {
    /// Force the outcome of newly created jobs.
    pub force_outcome: Option<JobStatus>,
    /// Keep new jobs RUNNING until `set_job_status` is called.
    pub hold_jobs: bool,
    /// Fail this many status reads with `Unavailable` before succeeding.
    pub status_failures: u32,
    /// Reject job creation with `Unavailable`.
    pub create_unavailable: bool,
}

impl Default for RunnerState {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

impl RunnerState {
    /// Create a runner with the given configuration.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RunnerStateInner {
                config,
                jobs: HashMap::new(),
                failure_injection: FailureInjection::default(),
                pending_status_failures: 0,
                status_reads: 0,
                id_counter: 0,
            })),
        }
    }

    /// Configure failure injection. Resets the transient read-failure budget.
    pub fn set_failure_injection(&self, injection: FailureInjection) {
        let mut inner = self.inner.write().unwrap();
        inner.pending_status_failures = injection.status_failures;
        inner.failure_injection = injection;
    }

    /// Get current failure injection config.
    pub fn failure_injection(&self) -> FailureInjection {
        let inner = self.inner.read().unwrap();
        inner.failure_injection.clone()
    }

    /// Create a job in RUNNING status and schedule its outcome.
    pub fn create_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
    ) -> Result<Job, RunnerError> {
        let mut inner = self.inner.write().unwrap();
        if inner.failure_injection.create_unavailable {
            return Err(RunnerError::Unavailable("job creation disabled".to_string()));
        }
        let running = inner
            .jobs
            .values()
            .filter(|j| j.job.status == JobStatus::Running)
            .count();
        if running >= inner.config.max_running_jobs {
            return Err(RunnerError::Busy(running));
        }

        inner.id_counter += 1;
        let job_id = format!("job-{:08x}", inner.id_counter);
        let submission_version_id = payload
            .get("submission_version_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let now = Instant::now();
        let transitions = if inner.failure_injection.hold_jobs {
            Vec::new()
        } else {
            let outcome = inner
                .failure_injection
                .force_outcome
                .unwrap_or(inner.config.default_outcome);
            vec![ScheduledTransition {
                to_status: outcome,
                at: now + inner.config.completion_delay,
            }]
        };

        let job = Job {
            id: job_id.clone(),
            job_type: job_type.to_string(),
            status: JobStatus::Running,
            submission_version_id,
        };
        inner.jobs.insert(
            job_id.clone(),
            RunnerJob {
                job: job.clone(),
                payload,
                created_at: now,
                transitions,
            },
        );
        debug!(job_id = %job_id, job_type, "simulated job created");
        Ok(job)
    }

    /// Read a job's status, applying any due scheduled changes first.
    pub fn job_status(&self, job_id: &str) -> Result<JobStatus, RunnerError> {
        {
            let mut inner = self.inner.write().unwrap();
            inner.status_reads += 1;
            if inner.pending_status_failures > 0 {
                inner.pending_status_failures -= 1;
                return Err(RunnerError::Unavailable("injected status failure".to_string()));
            }
        }
        self.process_transitions(job_id);
        let inner = self.inner.read().unwrap();
        inner
            .jobs
            .get(job_id)
            .map(|j| j.job.status)
            .ok_or_else(|| RunnerError::NotFound(job_id.to_string()))
    }

    /// Get a job by ID.
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.process_transitions(job_id);
        let inner = self.inner.read().unwrap();
        inner.jobs.get(job_id).map(|j| j.job.clone())
    }

    /// Get the payload a job was created with.
    pub fn job_payload(&self, job_id: &str) -> Option<serde_json::Value> {
        let inner = self.inner.read().unwrap();
        inner.jobs.get(job_id).map(|j| j.payload.clone())
    }

    /// Set a job's status directly, dropping any scheduled changes.
    pub fn set_job_status(&self, job_id: &str, status: JobStatus) -> Option<JobStatus> {
        let mut inner = self.inner.write().unwrap();
        inner.jobs.get_mut(job_id).map(|j| {
            let old = j.job.status;
            j.job.status = status;
            j.transitions.clear();
            old
        })
    }

    /// Schedule status changes relative to now.
    pub fn schedule_transitions(&self, job_id: &str, transitions: Vec<(JobStatus, Duration)>) {
        let mut inner = self.inner.write().unwrap();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            let now = Instant::now();
            job.transitions = transitions
                .into_iter()
                .map(|(status, delay)| ScheduledTransition {
                    to_status: status,
                    at: now + delay,
                })
                .collect();
        }
    }

    /// Apply scheduled changes that are due.
    pub fn process_transitions(&self, job_id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(job) = inner.jobs.get_mut(job_id) {
            let now = Instant::now();
            while let Some(transition) = job.transitions.first() {
                if transition.at <= now {
                    job.job.status = transition.to_status;
                    job.transitions.remove(0);
                } else {
                    break;
                }
            }
        }
    }

    /// Number of jobs currently RUNNING.
    pub fn running_job_count(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner
            .jobs
            .values()
            .filter(|j| j.job.status == JobStatus::Running)
            .count()
    }

    /// Total jobs created.
    pub fn job_count(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.jobs.len()
    }

    /// Total status reads served, including injected failures.
    pub fn status_reads(&self) -> u64 {
        let inner = self.inner.read().unwrap();
        inner.status_reads
    }
}
