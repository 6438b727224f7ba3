//! Job status types.
//!
//! Jobs are owned by the job runner; the engine only reads their status and
//! the link back to the submission version.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status as reported by the job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Job is still executing.
    Running,
    /// Job finished successfully.
    Completed,
    /// Job finished with failure.
    Failed,
}

impl JobStatus {
    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier.
    pub id: String,
    /// Job type (e.g. "publish").
    #[serde(rename = "type")]
    pub job_type: String,
    /// Current status.
    pub status: JobStatus,
    /// Submission version the job was started for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_version_id: Option<String>,
}

/// Job status request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusRequest {
    /// The job ID to query.
    pub job_id: String,
}

/// Job status response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// The job ID.
    pub job_id: String,
    /// Current job status.
    pub status: JobStatus,
}

/// Job completion callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCallbackRequest {
    /// The job whose outcome should be applied.
    pub job_id: String,
}

/// Payload for giving up on a job whose poll budget ran out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAbandonRequest {
    /// The job to detach from its version.
    pub job_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_type_field_named_type() {
        let job = Job {
            id: "job-1".to_string(),
            job_type: "publish".to_string(),
            status: JobStatus::Running,
            submission_version_id: Some("v-1".to_string()),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "publish");
        assert_eq!(json["status"], "RUNNING");
    }
}
