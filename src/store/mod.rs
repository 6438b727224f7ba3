//! Submission version storage
//!
//! Versions are mutated only through [`VersionStore::transact`], which
//! checks the expected `occ`, runs the caller's commit function, and applies
//! the status write, job link change and activity entry as one unit. A
//! caller that loses the `occ` race sees `ConcurrentModification` and none
//! of its side effects.

mod activity;

pub use activity::{Activity, ActivityLog, ActivityType, MemoryActivityLog};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A persisted submission version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionVersion {
    pub id: String,
    pub submission_id: String,
    /// Venue whose workflow governs this version.
    pub venue: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Optimistic-concurrency counter, bumped on every status or job change.
    pub occ: u64,
    pub date_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
}

impl SubmissionVersion {
    /// A fresh version in `initial_state`.
    pub fn new(
        submission_id: impl Into<String>,
        venue: impl Into<String>,
        initial_state: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            submission_id: submission_id.into(),
            venue: venue.into(),
            status: initial_state.into(),
            job_id: None,
            occ: 0,
            date_created: Utc::now(),
            date_published: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn has_job(&self) -> bool {
        self.job_id.is_some()
    }
}

/// What a running job will do to its version once it completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLink {
    pub job_id: String,
    pub version_id: String,
    /// Name of the transition that started the job.
    pub transition: String,
    pub target_state_name: String,
    pub requested_by: String,
    /// Publish date override supplied with the original request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_override: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Change to a version's job attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobChange {
    Keep,
    Attach(JobLink),
    Detach,
}

/// A mutation to apply under the `occ` check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// New status; `None` keeps the current one.
    pub status: Option<String>,
    pub job: JobChange,
    /// Publish date to stamp if none is set yet.
    pub date_published: Option<DateTime<Utc>>,
    pub activity_type: ActivityType,
    pub actor: String,
}

/// Version persistence contract.
pub trait VersionStore: Send + Sync {
    fn get(&self, version_id: &str) -> Result<SubmissionVersion, EngineError>;

    fn insert(&self, version: SubmissionVersion);

    /// Link for a job, whether or not it is still attached.
    fn job_link(&self, job_id: &str) -> Option<JobLink>;

    /// Atomically check `expected_occ`, build a commit from the current
    /// version, and apply it. `occ` is incremented exactly once.
    fn transact(
        &self,
        version_id: &str,
        expected_occ: u64,
        build: &mut dyn FnMut(&SubmissionVersion) -> Result<Commit, EngineError>,
    ) -> Result<(SubmissionVersion, Activity), EngineError>;

    fn activity(&self) -> Arc<dyn ActivityLog>;
}

/// In-memory store. Clones share state.
///
/// Each version has its own slot. `transact` serializes on the slot's gate
/// only, so a slow commit builder (job creation) holds up requests for that
/// version and nothing else. Reads never take a gate.
#[derive(Clone)]
pub struct MemoryStore {
    versions: Arc<RwLock<HashMap<String, Arc<VersionSlot>>>>,
    /// Links by job id. Kept after detach so late callbacks can be told the
    /// job is stale rather than unknown.
    links: Arc<RwLock<HashMap<String, JobLink>>>,
    activity: Arc<dyn ActivityLog>,
}

#[derive(Debug)]
struct VersionSlot {
    gate: Mutex<()>,
    version: RwLock<SubmissionVersion>,
}

impl VersionSlot {
    fn new(version: SubmissionVersion) -> Self {
        Self {
            gate: Mutex::new(()),
            version: RwLock::new(version),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_activity_log(Arc::new(MemoryActivityLog::new()))
    }

    pub fn with_activity_log(activity: Arc<dyn ActivityLog>) -> Self {
        Self {
            versions: Arc::new(RwLock::new(HashMap::new())),
            links: Arc::new(RwLock::new(HashMap::new())),
            activity,
        }
    }

    pub fn version_count(&self) -> usize {
        self.versions.read().unwrap().len()
    }

    fn slot(&self, version_id: &str) -> Result<Arc<VersionSlot>, EngineError> {
        self.versions
            .read()
            .unwrap()
            .get(version_id)
            .cloned()
            .ok_or_else(|| EngineError::VersionNotFound(version_id.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionStore for MemoryStore {
    fn get(&self, version_id: &str) -> Result<SubmissionVersion, EngineError> {
        let slot = self.slot(version_id)?;
        let version = slot.version.read().unwrap().clone();
        Ok(version)
    }

    fn insert(&self, version: SubmissionVersion) {
        self.versions
            .write()
            .unwrap()
            .insert(version.id.clone(), Arc::new(VersionSlot::new(version)));
    }

    fn job_link(&self, job_id: &str) -> Option<JobLink> {
        self.links.read().unwrap().get(job_id).cloned()
    }

    fn transact(
        &self,
        version_id: &str,
        expected_occ: u64,
        build: &mut dyn FnMut(&SubmissionVersion) -> Result<Commit, EngineError>,
    ) -> Result<(SubmissionVersion, Activity), EngineError> {
        let slot = self.slot(version_id)?;
        let _gate = slot.gate.lock().unwrap();
        let current = slot.version.read().unwrap().clone();

        if current.occ != expected_occ {
            return Err(EngineError::ConcurrentModification {
                version_id: version_id.to_string(),
                expected: expected_occ,
                actual: current.occ,
            });
        }

        let commit = build(&current)?;

        let mut next = current;
        if let Some(status) = commit.status {
            next.status = status;
        }
        match commit.job {
            JobChange::Keep => {}
            JobChange::Attach(link) => {
                next.job_id = Some(link.job_id.clone());
                self.links.write().unwrap().insert(link.job_id.clone(), link);
            }
            JobChange::Detach => next.job_id = None,
        }
        if next.date_published.is_none() {
            next.date_published = commit.date_published;
        }
        next.occ += 1;

        let activity = Activity::new(commit.activity_type, commit.actor, next.submission_id.clone())
            .for_version(next.id.clone())
            .with_status(next.status.clone());
        self.activity.record(activity.clone());
        *slot.version.write().unwrap() = next.clone();

        Ok((next, activity))
    }

    fn activity(&self) -> Arc<dyn ActivityLog> {
        self.activity.clone()
    }
}
