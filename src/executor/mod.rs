//! Transition executor
//!
//! Server-authoritative application of transitions to submission versions.
//!
//! Synchronous transitions write the target status directly. Job-linked
//! transitions start a job and attach it, leaving the status unchanged;
//! [`TransitionExecutor::finalize`] later applies or abandons the target
//! once the job's outcome is known. Every write is conditioned on `occ`.

mod finalize;

pub use finalize::FinalizeOutcome;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use subflow_protocol::ops::{TransitionResponse, TransitionSummary};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::guard::{is_allowed, Actor, ScopeChecker};
use crate::notify::{events, NotificationEvent, Notifier};
use crate::resolve::resolve_transition;
use crate::runner::JobRunner;
use crate::store::{ActivityType, Commit, JobChange, JobLink, SubmissionVersion, VersionStore};
use crate::workflow::{Transition, Workflow, WorkflowRegistry};

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Publish date override.
    pub date: Option<DateTime<Utc>>,
    /// `occ` the caller read. Defaults to the version's current `occ`.
    pub expected_occ: Option<u64>,
}

impl ExecuteOptions {
    pub fn at_occ(occ: u64) -> Self {
        Self {
            expected_occ: Some(occ),
            ..Self::default()
        }
    }
}

/// Result of a successful [`TransitionExecutor::execute`].
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub version: SubmissionVersion,
    pub transition: Transition,
    /// Set for job-linked transitions; the status is unchanged until finalize.
    pub job_id: Option<String>,
}

impl TransitionOutcome {
    pub fn is_pending(&self) -> bool {
        self.job_id.is_some()
    }

    pub fn to_response(&self) -> TransitionResponse {
        TransitionResponse {
            status: self.version.status.clone(),
            occ: self.version.occ,
            transition: Some(self.transition.summary()),
            job_id: self.job_id.clone(),
            date_published: self.version.date_published,
        }
    }
}

/// Applies transitions against a store, with collaborators injected.
#[derive(Clone)]
pub struct TransitionExecutor {
    registry: Arc<WorkflowRegistry>,
    store: Arc<dyn VersionStore>,
    scopes: Arc<dyn ScopeChecker>,
    notifier: Arc<dyn Notifier>,
    runner: Arc<dyn JobRunner>,
}

impl TransitionExecutor {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        store: Arc<dyn VersionStore>,
        scopes: Arc<dyn ScopeChecker>,
        notifier: Arc<dyn Notifier>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            registry,
            store,
            scopes,
            notifier,
            runner,
        }
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<dyn JobRunner> {
        &self.runner
    }

    /// Create a version in its venue workflow's initial state.
    pub fn create_version(&self, submission_id: &str, venue: &str) -> Result<SubmissionVersion, EngineError> {
        let workflow = self.registry.workflow_for(venue)?;
        let version = SubmissionVersion::new(submission_id, venue, workflow.initial_state.clone());
        self.store.insert(version.clone());
        info!(version_id = %version.id, venue, status = %version.status, "submission version created");
        Ok(version)
    }

    /// Transitions `actor` may request from the version's current status.
    pub fn available_transitions(
        &self,
        actor: &Actor,
        version_id: &str,
    ) -> Result<Vec<TransitionSummary>, EngineError> {
        let version = self.store.get(version_id)?;
        let workflow = self.registry.workflow_for(&version.venue)?;
        Ok(workflow
            .available_transitions(&version.status)
            .into_iter()
            .filter(|t| is_allowed(self.scopes.as_ref(), actor, t, &version.venue))
            .map(Transition::summary)
            .collect())
    }

    /// Resolve, guard and apply a transition to `target`.
    pub fn execute(
        &self,
        actor: &Actor,
        version_id: &str,
        target: &str,
        opts: &ExecuteOptions,
    ) -> Result<TransitionOutcome, EngineError> {
        let version = self.store.get(version_id)?;
        let workflow = self.registry.workflow_for(&version.venue)?;
        let transition = resolve_transition(&workflow, &version.status, target)?.clone();

        if !is_allowed(self.scopes.as_ref(), actor, &transition, &version.venue) {
            return Err(EngineError::Forbidden {
                actor: actor.id.clone(),
                transition: transition.name.clone(),
                venue: version.venue.clone(),
            });
        }

        let expected_occ = opts.expected_occ.unwrap_or(version.occ);
        if transition.requires_job {
            self.start_job(actor, &version, transition, expected_occ, opts)
        } else {
            self.apply_sync(actor, &version, &workflow, transition, expected_occ, opts)
        }
    }

    fn apply_sync(
        &self,
        actor: &Actor,
        version: &SubmissionVersion,
        workflow: &Workflow,
        transition: Transition,
        expected_occ: u64,
        opts: &ExecuteOptions,
    ) -> Result<TransitionOutcome, EngineError> {
        let date_published = publish_date(workflow, &transition.target_state_name, opts.date);
        let (updated, _) = self.store.transact(&version.id, expected_occ, &mut |_| {
            Ok(Commit {
                status: Some(transition.target_state_name.clone()),
                // A direct transition supersedes any job still running.
                job: JobChange::Detach,
                date_published,
                activity_type: ActivityType::TransitionApplied,
                actor: actor.id.clone(),
            })
        })?;

        info!(
            version_id = %updated.id,
            venue = %updated.venue,
            transition = %transition.name,
            target = %updated.status,
            occ = updated.occ,
            "transition applied"
        );
        self.notify(events::TRANSITIONED, &updated, &transition.name);
        if version.date_published.is_none() && updated.date_published.is_some() {
            self.notify(events::PUBLISHED, &updated, &transition.name);
        }

        Ok(TransitionOutcome {
            version: updated,
            transition,
            job_id: None,
        })
    }

    fn start_job(
        &self,
        actor: &Actor,
        version: &SubmissionVersion,
        transition: Transition,
        expected_occ: u64,
        opts: &ExecuteOptions,
    ) -> Result<TransitionOutcome, EngineError> {
        let payload = json!({
            "submission_id": version.submission_id,
            "submission_version_id": version.id,
            "venue": version.venue,
            "transition": transition.name,
            "target_state_name": transition.target_state_name,
        });

        // The job is created under the occ check so a losing request never
        // leaves an orphaned job behind.
        let (updated, _) = self.store.transact(&version.id, expected_occ, &mut |current| {
            let job_id = self.runner.create_job(&transition.name, payload.clone())?;
            Ok(Commit {
                status: None,
                job: JobChange::Attach(JobLink {
                    job_id,
                    version_id: current.id.clone(),
                    transition: transition.name.clone(),
                    target_state_name: transition.target_state_name.clone(),
                    requested_by: actor.id.clone(),
                    date_override: opts.date,
                    created_at: Utc::now(),
                }),
                date_published: None,
                activity_type: ActivityType::JobStarted,
                actor: actor.id.clone(),
            })
        })?;

        info!(
            version_id = %updated.id,
            job_id = ?updated.job_id,
            transition = %transition.name,
            target = %transition.target_state_name,
            occ = updated.occ,
            "job started"
        );
        self.notify(events::JOB_STARTED, &updated, &transition.name);

        let job_id = updated.job_id.clone();
        Ok(TransitionOutcome {
            version: updated,
            transition,
            job_id,
        })
    }

    /// Best-effort notification; failures are logged and dropped.
    fn notify(&self, event_type: &str, version: &SubmissionVersion, transition: &str) {
        let event = NotificationEvent::new(
            event_type,
            json!({
                "submission_id": version.submission_id,
                "submission_version_id": version.id,
                "venue": version.venue,
                "transition": transition,
                "status": version.status,
                "job_id": version.job_id,
                "occ": version.occ,
            }),
        );
        if let Err(err) = self.notifier.notify(&event) {
            warn!(error = %err, version_id = %version.id, "notification failed");
        }
    }
}

/// Publish date for entering `target`, if it is a published state.
fn publish_date(workflow: &Workflow, target: &str, date: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    workflow
        .state(target)
        .filter(|s| s.published)
        .map(|_| date.unwrap_or_else(Utc::now))
}
