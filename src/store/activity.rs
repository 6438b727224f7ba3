//! Activity log
//!
//! Append-only record of what happened to a submission. One entry per
//! successful executor commit; reads are most-recent-first.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    /// A synchronous transition changed the status.
    TransitionApplied,
    /// A job-linked transition started its job.
    JobStarted,
    /// A linked job completed and its target status was applied.
    JobCompleted,
    /// A linked job failed or ran out of budget; status left unchanged.
    JobAbandoned,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransitionApplied => write!(f, "TRANSITION_APPLIED"),
            Self::JobStarted => write!(f, "JOB_STARTED"),
            Self::JobCompleted => write!(f, "JOB_COMPLETED"),
            Self::JobAbandoned => write!(f, "JOB_ABANDONED"),
        }
    }
}

/// An immutable activity entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub activity_type: ActivityType,
    pub activity_by: String,
    pub submission_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub date_created: DateTime<Utc>,
}

impl Activity {
    pub fn new(activity_type: ActivityType, activity_by: impl Into<String>, submission_id: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            activity_type,
            activity_by: activity_by.into(),
            submission_id: submission_id.into(),
            submission_version_id: None,
            status: None,
            date_created: Utc::now(),
        }
    }

    pub fn for_version(mut self, version_id: impl Into<String>) -> Self {
        self.submission_version_id = Some(version_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Activity-log collaborator.
pub trait ActivityLog: Send + Sync {
    fn record(&self, activity: Activity);

    /// Entries for a submission, most recent first.
    fn list(&self, submission_id: &str) -> Vec<Activity>;
}

/// In-memory activity log.
#[derive(Debug, Clone, Default)]
pub struct MemoryActivityLog {
    entries: Arc<RwLock<HashMap<String, Vec<Activity>>>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityLog for MemoryActivityLog {
    fn record(&self, activity: Activity) {
        self.entries
            .write()
            .unwrap()
            .entry(activity.submission_id.clone())
            .or_default()
            .push(activity);
    }

    fn list(&self, submission_id: &str) -> Vec<Activity> {
        self.entries
            .read()
            .unwrap()
            .get(submission_id)
            .map(|entries| entries.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}
