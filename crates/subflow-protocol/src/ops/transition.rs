//! Transition operation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transition request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    /// Version to transition.
    pub submission_version_id: String,
    /// Requested target status.
    pub target_status: String,
    /// Publish date override, used when the target state is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// `occ` the client last read; the write fails if it has moved on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occ: Option<u64>,
}

impl TransitionRequest {
    pub fn new(submission_version_id: impl Into<String>, target_status: impl Into<String>) -> Self {
        Self {
            submission_version_id: submission_version_id.into(),
            target_status: target_status.into(),
            date: None,
            occ: None,
        }
    }

    pub fn with_occ(mut self, occ: u64) -> Self {
        self.occ = Some(occ);
        self
    }
}

/// The transition that was applied or started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSummary {
    /// Transition name.
    pub name: String,
    /// Source state, `None` for any-state transitions.
    pub source_state_name: Option<String>,
    /// Target state.
    pub target_state_name: String,
    /// Whether the transition waits on a job.
    pub requires_job: bool,
}

/// Transition response payload.
///
/// For job-linked transitions `status` is the unchanged current status and
/// `job_id` names the job to poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    /// Status after the request.
    pub status: String,
    /// Optimistic concurrency counter after the request.
    pub occ: u64,
    /// The matched transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionSummary>,
    /// Job to poll, for job-linked transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Publish date after the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
}

impl TransitionResponse {
    /// Whether the response is a pending marker for a job-linked transition.
    pub fn is_pending(&self) -> bool {
        self.job_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let json = serde_json::json!({
            "submissionVersionId": "v-1",
            "targetStatus": "PUBLISHED"
        });
        let req: TransitionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.submission_version_id, "v-1");
        assert_eq!(req.target_status, "PUBLISHED");
        assert!(req.date.is_none());
        assert!(req.occ.is_none());
    }

    #[test]
    fn test_request_with_occ_serializes() {
        let req = TransitionRequest::new("v-1", "IN_REVIEW").with_occ(3);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["occ"], 3);
        assert!(json.get("date").is_none());
    }

    #[test]
    fn test_pending_marker() {
        let resp = TransitionResponse {
            status: "IN_REVIEW".to_string(),
            occ: 2,
            transition: None,
            job_id: Some("job-1".to_string()),
            date_published: None,
        };
        assert!(resp.is_pending());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert!(json.get("datePublished").is_none());
    }
}
