//! Engine error taxonomy
//!
//! Per-request failures are returned to the caller and never partially
//! mutate persisted state. Each maps to a stable protocol [`ErrorCode`].

use serde_json::json;
use subflow_protocol::{ApiError, ErrorCode};

use crate::runner::JobRunnerError;
use crate::workflow::Violation;

/// Errors from resolving, guarding and executing transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The venue's workflow is broken. Reported to operators, never retried.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
        violations: Vec<Violation>,
    },

    #[error("no transition from '{from}' to '{to}'")]
    NoSuchTransition { from: String, to: String },

    /// More than one candidate; the workflow needs fixing.
    #[error("ambiguous transition from '{from}' to '{to}': candidates {candidates:?}")]
    AmbiguousTransition {
        from: String,
        to: String,
        candidates: Vec<String>,
    },

    #[error("actor '{actor}' may not '{transition}' in venue '{venue}'")]
    Forbidden {
        actor: String,
        transition: String,
        venue: String,
    },

    #[error("submission version '{version_id}' changed concurrently (expected occ {expected}, found {actual})")]
    ConcurrentModification {
        version_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("submission version '{0}' not found")]
    VersionNotFound(String),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    /// The job was detached or replaced since it was started.
    #[error("job '{job_id}' is no longer attached to submission version '{version_id}'")]
    StaleJob { job_id: String, version_id: String },

    #[error("job runner: {0}")]
    JobRunner(#[from] JobRunnerError),
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            violations: Vec::new(),
        }
    }

    /// Stable protocol code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration { .. } | Self::AmbiguousTransition { .. } => ErrorCode::Configuration,
            Self::NoSuchTransition { .. } => ErrorCode::NoSuchTransition,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            Self::VersionNotFound(_) => ErrorCode::VersionNotFound,
            Self::JobNotFound(_) => ErrorCode::JobNotFound,
            Self::StaleJob { .. } => ErrorCode::StaleJob,
            Self::JobRunner(JobRunnerError::NotFound(_)) => ErrorCode::JobNotFound,
            Self::JobRunner(JobRunnerError::Unavailable(_)) => ErrorCode::JobRunnerUnavailable,
        }
    }

    /// Whether the caller may retry after re-fetching state.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Wire form, with machine-readable details where useful.
    pub fn to_api_error(&self) -> ApiError {
        let message = self.to_string();
        match self {
            Self::Configuration { violations, .. } if !violations.is_empty() => {
                let paths: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                ApiError::with_data(self.code(), message, json!({ "violations": paths }))
            }
            Self::AmbiguousTransition { candidates, .. } => {
                ApiError::with_data(self.code(), message, json!({ "candidates": candidates }))
            }
            Self::ConcurrentModification { expected, actual, .. } => {
                ApiError::with_data(self.code(), message, json!({ "expected": expected, "actual": actual }))
            }
            _ => ApiError::new(self.code(), message),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        err.to_api_error()
    }
}
