//! Transition API
//!
//! Transport-agnostic surface over the executor:
//! - `transition`: request a status change
//! - `job_status`: read a linked job's status
//! - `job_callback`: apply a finished job's outcome
//! - `job_abandon`: detach a job the caller has stopped waiting for
//!
//! Engine errors leave as coded [`ApiError`]s with HTTP-equivalent status.

mod dispatch;

pub use dispatch::dispatch;

use std::sync::Arc;

use subflow_protocol::ops::{JobStatusResponse, TransitionRequest, TransitionResponse};
use subflow_protocol::ApiError;
use tracing::debug;

use crate::executor::{ExecuteOptions, FinalizeOutcome, TransitionExecutor};
use crate::guard::Actor;
use crate::runner::{JobRunner, JobRunnerError};
use crate::store::{SubmissionVersion, VersionStore};
use crate::workflow::Workflow;

/// Server-side API handlers.
#[derive(Clone)]
pub struct TransitionApi {
    executor: TransitionExecutor,
}

impl TransitionApi {
    pub fn new(executor: TransitionExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &TransitionExecutor {
        &self.executor
    }

    /// `POST transition`
    pub fn transition(&self, actor: &Actor, request: &TransitionRequest) -> Result<TransitionResponse, ApiError> {
        debug!(
            actor = %actor.id,
            version_id = %request.submission_version_id,
            target = %request.target_status,
            "transition requested"
        );
        let opts = ExecuteOptions {
            date: request.date,
            expected_occ: request.occ,
        };
        let outcome = self
            .executor
            .execute(actor, &request.submission_version_id, &request.target_status, &opts)?;
        Ok(outcome.to_response())
    }

    /// `GET job/{id}`
    pub fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        let status = self.executor.runner().job_status(job_id).map_err(|e| match e {
            JobRunnerError::NotFound(id) => ApiError::job_not_found(&id),
            other => crate::error::EngineError::from(other).to_api_error(),
        })?;
        Ok(JobStatusResponse {
            job_id: job_id.to_string(),
            status,
        })
    }

    /// Apply a finished job's outcome to its version.
    ///
    /// While the job is still running the response is the unchanged pending
    /// marker, so the callback is safe to repeat.
    pub fn job_callback(&self, job_id: &str) -> Result<TransitionResponse, ApiError> {
        let link = self
            .executor
            .store()
            .job_link(job_id)
            .ok_or_else(|| ApiError::job_not_found(job_id))?;
        let outcome = self.executor.finalize(job_id)?;
        let version = outcome.version();
        let transition = self
            .executor
            .registry()
            .workflow_for(&version.venue)
            .ok()
            .and_then(|wf| wf.transition(&link.transition).map(|t| t.summary()));
        Ok(TransitionResponse {
            status: version.status.clone(),
            occ: version.occ,
            transition,
            job_id: match outcome {
                FinalizeOutcome::StillRunning(_) => Some(job_id.to_string()),
                _ => None,
            },
            date_published: version.date_published,
        })
    }

    /// Detach a job without applying its target; the status is unchanged.
    ///
    /// Fails with `STALE_JOB` once the job has been finalized or replaced.
    pub fn job_abandon(&self, job_id: &str) -> Result<TransitionResponse, ApiError> {
        let version = self.executor.abandon(job_id)?;
        Ok(TransitionResponse {
            status: version.status.clone(),
            occ: version.occ,
            transition: None,
            job_id: None,
            date_published: version.date_published,
        })
    }

    /// Current server copy of a version.
    pub fn version(&self, version_id: &str) -> Result<SubmissionVersion, ApiError> {
        Ok(self.executor.store().get(version_id)?)
    }

    /// Workflow governing a venue, for client-side resolution.
    pub fn workflow_for(&self, venue: &str) -> Result<Arc<Workflow>, ApiError> {
        Ok(self.executor.registry().workflow_for(venue)?)
    }
}
