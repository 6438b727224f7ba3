//! Runner configuration.

use std::time::Duration;

use subflow_protocol::JobStatus;

/// Simulated runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How long a job stays RUNNING before reaching its outcome.
    pub completion_delay: Duration,
    /// Outcome jobs reach unless failure injection overrides it.
    pub default_outcome: JobStatus,
    /// Maximum jobs allowed to be RUNNING at once.
    pub max_running_jobs: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            completion_delay: Duration::from_millis(100),
            default_outcome: JobStatus::Completed,
            max_running_jobs: 64,
        }
    }
}

impl RunnerConfig {
    /// Config whose jobs finish after `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            completion_delay: delay,
            ..Self::default()
        }
    }
}
