//! Error types for the transition API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned in API error responses.
///
/// These codes are stable and used for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed JSON, missing required fields, or invalid field values.
    InvalidRequest,
    /// Envelope version is not supported.
    UnsupportedProtocol,
    /// Unknown operation requested.
    UnknownOperation,
    /// No transition leads from the current status to the requested one.
    NoSuchTransition,
    /// The request carried no actor.
    Unauthenticated,
    /// The actor lacks a required scope.
    Forbidden,
    /// Another actor transitioned the version first.
    ConcurrentModification,
    /// The job no longer matches the version it was started for.
    StaleJob,
    /// Submission version not found.
    VersionNotFound,
    /// Job not found.
    JobNotFound,
    /// The venue's workflow is broken or ambiguous.
    Configuration,
    /// The job runner could not be reached.
    JobRunnerUnavailable,
}

impl ErrorCode {
    /// HTTP-equivalent status for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest
            | Self::UnsupportedProtocol
            | Self::UnknownOperation
            | Self::NoSuchTransition => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden => 403,
            Self::VersionNotFound | Self::JobNotFound => 404,
            Self::ConcurrentModification | Self::StaleJob => 409,
            Self::Configuration => 500,
            Self::JobRunnerUnavailable => 503,
        }
    }

    /// Whether a client may retry after re-fetching state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification | Self::JobRunnerUnavailable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::UnsupportedProtocol => write!(f, "UNSUPPORTED_PROTOCOL"),
            Self::UnknownOperation => write!(f, "UNKNOWN_OPERATION"),
            Self::NoSuchTransition => write!(f, "NO_SUCH_TRANSITION"),
            Self::Unauthenticated => write!(f, "UNAUTHENTICATED"),
            Self::Forbidden => write!(f, "FORBIDDEN"),
            Self::ConcurrentModification => write!(f, "CONCURRENT_MODIFICATION"),
            Self::StaleJob => write!(f, "STALE_JOB"),
            Self::VersionNotFound => write!(f, "VERSION_NOT_FOUND"),
            Self::JobNotFound => write!(f, "JOB_NOT_FOUND"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::JobRunnerUnavailable => write!(f, "JOB_RUNNER_UNAVAILABLE"),
        }
    }
}

/// API error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code from the registry.
    pub code: ErrorCode,
    /// Human-readable, single-line error message.
    pub message: String,
    /// Optional machine-readable details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new API error with additional data.
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create an INVALID_REQUEST error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create an UNSUPPORTED_PROTOCOL error.
    pub fn unsupported_protocol(version: i32, supported: i32) -> Self {
        Self::with_data(
            ErrorCode::UnsupportedProtocol,
            format!("protocol_version {} is not supported (expected {})", version, supported),
            serde_json::json!({ "requested": version, "supported": supported }),
        )
    }

    /// Create an UNKNOWN_OPERATION error.
    pub fn unknown_operation(op: &str) -> Self {
        Self::with_data(
            ErrorCode::UnknownOperation,
            format!("unknown operation: {}", op),
            serde_json::json!({ "op": op }),
        )
    }

    /// Create an UNAUTHENTICATED error.
    pub fn unauthenticated(op: &str) -> Self {
        Self::with_data(
            ErrorCode::Unauthenticated,
            format!("operation '{}' requires an actor", op),
            serde_json::json!({ "op": op }),
        )
    }

    /// Create a JOB_NOT_FOUND error.
    pub fn job_not_found(job_id: &str) -> Self {
        Self::with_data(
            ErrorCode::JobNotFound,
            format!("job '{}' not found", job_id),
            serde_json::json!({ "job_id": job_id }),
        )
    }

    /// Create a VERSION_NOT_FOUND error.
    pub fn version_not_found(version_id: &str) -> Self {
        Self::with_data(
            ErrorCode::VersionNotFound,
            format!("submission version '{}' not found", version_id),
            serde_json::json!({ "submission_version_id": version_id }),
        )
    }

    /// HTTP-equivalent status for this error.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
