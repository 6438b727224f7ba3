//! Client reconciliation state machine
//!
//! What the client shows is either the server-confirmed `base` or `base`
//! with an optimistic overlay on top. At most one transition is in flight
//! per displayed item. Every error path drops the overlay and the active
//! transition together, so a rollback always lands exactly on `base`.
//!
//! Overlays live only in memory for the life of a session.

mod session;

pub use session::ClientSession;

use serde::{Deserialize, Serialize};
use subflow_protocol::ops::{TransitionResponse, TransitionSummary};
use subflow_protocol::{ApiError, JobStatus};

use crate::error::EngineError;
use crate::poller::PollError;
use crate::store::SubmissionVersion;

/// Unconfirmed fields shown over `base`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionOverlay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl VersionOverlay {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
        }
    }

    fn apply(&self, base: &SubmissionVersion) -> SubmissionVersion {
        let mut item = base.clone();
        if let Some(status) = &self.status {
            item.status = status.clone();
        }
        item
    }
}

/// The transition currently in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTransition {
    pub transition: TransitionSummary,
    /// Known once the server has started the job.
    pub job_id: Option<String>,
}

/// Notifications for whoever renders the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReconcileEvent {
    /// A synchronous transition was confirmed.
    Confirmed { status: String },
    /// A job was started; poll it.
    PollingStarted { job_id: String },
    /// The job completed; activity for the item changed.
    ActivityUpdated { status: String },
    /// The request failed; the display reverted to `base`.
    RolledBack { reason: String },
    /// The job failed; the display reverted to `base`.
    JobFailed { job_id: String },
    /// Polling gave up; the display reverted to `base`.
    PollingFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("transition '{0}' is already in flight")]
    TransitionInFlight(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Client-held display state for one submission version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDisplayState {
    pub base: SubmissionVersion,
    pub overlay: Option<VersionOverlay>,
    pub active: Option<ActiveTransition>,
}

impl ClientDisplayState {
    pub fn new(base: SubmissionVersion) -> Self {
        Self {
            base,
            overlay: None,
            active: None,
        }
    }

    /// `overlay ?? base`
    pub fn display_item(&self) -> SubmissionVersion {
        match &self.overlay {
            Some(overlay) => overlay.apply(&self.base),
            None => self.base.clone(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.active.is_some()
    }

    /// Job being waited on, if the server has started one.
    pub fn pending_job(&self) -> Option<&str> {
        self.active.as_ref().and_then(|a| a.job_id.as_deref())
    }

    /// Record a user's transition request before it is sent.
    ///
    /// Job-linked transitions show no status change; synchronous ones show
    /// the target status immediately.
    pub fn submit_transition(&mut self, transition: TransitionSummary) -> Result<(), ReconcileError> {
        if let Some(active) = &self.active {
            return Err(ReconcileError::TransitionInFlight(active.transition.name.clone()));
        }
        if !transition.requires_job {
            self.overlay = Some(VersionOverlay::status(transition.target_state_name.clone()));
        }
        self.active = Some(ActiveTransition {
            transition,
            job_id: None,
        });
        Ok(())
    }

    /// Take the server-confirmed fields of `response` into `base`. The
    /// overlay and active transition are left alone.
    pub fn adopt_confirmed(&mut self, response: &TransitionResponse) {
        self.base.status = response.status.clone();
        self.base.occ = response.occ;
        self.base.job_id = response.job_id.clone();
        self.base.date_published = response.date_published;
    }

    /// Adopt the server's answer to the transition request.
    pub fn on_transition_success(&mut self, response: &TransitionResponse) -> Vec<ReconcileEvent> {
        self.adopt_confirmed(response);

        match &response.job_id {
            Some(job_id) => {
                match &mut self.active {
                    Some(active) => active.job_id = Some(job_id.clone()),
                    None => {
                        self.active = response.transition.clone().map(|transition| ActiveTransition {
                            transition,
                            job_id: Some(job_id.clone()),
                        })
                    }
                }
                vec![ReconcileEvent::PollingStarted { job_id: job_id.clone() }]
            }
            None => {
                self.overlay = None;
                self.active = None;
                vec![ReconcileEvent::Confirmed {
                    status: response.status.clone(),
                }]
            }
        }
    }

    /// Drop everything optimistic.
    pub fn on_transition_error(&mut self, error: &ApiError) -> Vec<ReconcileEvent> {
        self.clear();
        vec![ReconcileEvent::RolledBack {
            reason: error.to_string(),
        }]
    }

    /// Apply a polled job status. Statuses for other jobs are ignored.
    pub fn on_job_status(&mut self, job_id: &str, status: JobStatus) -> Vec<ReconcileEvent> {
        if self.pending_job() != Some(job_id) {
            return Vec::new();
        }
        if status.is_terminal() {
            self.base.job_id = None;
        }
        match status {
            JobStatus::Running => Vec::new(),
            JobStatus::Completed => {
                let target = self
                    .active
                    .take()
                    .map(|a| a.transition.target_state_name)
                    .unwrap_or_else(|| self.base.status.clone());
                self.overlay = Some(VersionOverlay::status(target.clone()));
                vec![ReconcileEvent::ActivityUpdated { status: target }]
            }
            JobStatus::Failed => {
                self.clear();
                vec![ReconcileEvent::JobFailed {
                    job_id: job_id.to_string(),
                }]
            }
        }
    }

    /// Apply a settled job together with the server's finalize answer.
    pub fn on_job_settled(
        &mut self,
        job_id: &str,
        status: JobStatus,
        confirmed: &TransitionResponse,
    ) -> Vec<ReconcileEvent> {
        if self.pending_job() != Some(job_id) {
            return Vec::new();
        }
        self.adopt_confirmed(confirmed);
        self.on_job_status(job_id, status)
    }

    /// Give up on the active transition. The server job is no longer
    /// watched, so it is dropped from `base` too.
    pub fn on_polling_exhausted(&mut self, error: &PollError) -> Vec<ReconcileEvent> {
        if let Some(job_id) = self.pending_job() {
            if self.base.job_id.as_deref() == Some(job_id) {
                self.base.job_id = None;
            }
        }
        self.clear();
        vec![ReconcileEvent::PollingFailed {
            reason: error.to_string(),
        }]
    }

    /// Replace `base` with a fresh server copy.
    ///
    /// The overlay never survives a refresh. A job-linked transition stays
    /// active only while the server still shows its job attached.
    pub fn refresh_base(&mut self, base: SubmissionVersion) {
        self.overlay = None;
        let still_pending = match (&self.active, &base.job_id) {
            (Some(active), Some(job_id)) => active.job_id.as_deref() == Some(job_id.as_str()),
            _ => false,
        };
        if !still_pending {
            self.active = None;
        }
        self.base = base;
    }

    fn clear(&mut self) {
        self.overlay = None;
        self.active = None;
    }
}
