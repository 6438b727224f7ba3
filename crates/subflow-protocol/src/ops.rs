//! Operation-specific types.

pub mod job;
pub mod transition;

pub use job::{Job, JobAbandonRequest, JobCallbackRequest, JobStatus, JobStatusRequest, JobStatusResponse};
pub use transition::{TransitionRequest, TransitionResponse, TransitionSummary};

/// Known operation names.
pub mod names {
    pub const TRANSITION: &str = "transition";
    pub const JOB_STATUS: &str = "job_status";
    pub const JOB_CALLBACK: &str = "job_callback";
    pub const JOB_ABANDON: &str = "job_abandon";
}
