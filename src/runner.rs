//! Job runner contract
//!
//! The engine treats the runner as a black box: it creates jobs and reads
//! their status, nothing else.

use subflow_protocol::JobStatus;
use subflow_runner::{RunnerError, RunnerState};

/// Job runner failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobRunnerError {
    #[error("job '{0}' not found")]
    NotFound(String),

    /// Transient; the operation may succeed later.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl JobRunnerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Job-runner collaborator.
pub trait JobRunner: Send + Sync {
    /// Start a job in `RUNNING` and return its id.
    fn create_job(&self, job_type: &str, payload: serde_json::Value) -> Result<String, JobRunnerError>;

    fn job_status(&self, job_id: &str) -> Result<JobStatus, JobRunnerError>;
}

impl From<RunnerError> for JobRunnerError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::NotFound(id) => Self::NotFound(id),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl JobRunner for RunnerState {
    fn create_job(&self, job_type: &str, payload: serde_json::Value) -> Result<String, JobRunnerError> {
        Ok(RunnerState::create_job(self, job_type, payload)?.id)
    }

    fn job_status(&self, job_id: &str) -> Result<JobStatus, JobRunnerError> {
        Ok(RunnerState::job_status(self, job_id)?)
    }
}
