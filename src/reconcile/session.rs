//! A client session for one submission version.
//!
//! Wires [`ClientDisplayState`] to the transition API and a job poller: it
//! submits optimistically, sends the request, polls the job if one was
//! started, asks the server to finalize once the job settles, and feeds
//! every answer back into the display state.

use subflow_protocol::ops::TransitionRequest;
use subflow_protocol::{ErrorCode, JobStatus};
use tracing::{debug, warn};

use super::{ClientDisplayState, ReconcileError, ReconcileEvent};
use crate::api::TransitionApi;
use crate::guard::{can_request, Actor, ScopeChecker};
use crate::poller::{CancellationToken, JobPoller, PollError, PollExit};
use crate::resolve::resolve_transition;
use crate::store::VersionStore;

pub struct ClientSession {
    api: TransitionApi,
    actor: Actor,
    poller: JobPoller,
    token: CancellationToken,
    state: ClientDisplayState,
    events: Vec<ReconcileEvent>,
}

impl ClientSession {
    /// Open a session on the server's current copy of `version_id`.
    pub fn open(api: TransitionApi, actor: Actor, version_id: &str, poller: JobPoller) -> Result<Self, ReconcileError> {
        let base = api.executor().store().get(version_id)?;
        Ok(Self {
            api,
            actor,
            poller,
            token: CancellationToken::new(),
            state: ClientDisplayState::new(base),
            events: Vec::new(),
        })
    }

    /// Cancel polling from elsewhere (teardown, Ctrl-C).
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn state(&self) -> &ClientDisplayState {
        &self.state
    }

    /// Every event surfaced so far.
    pub fn events(&self) -> &[ReconcileEvent] {
        &self.events
    }

    /// Advisory affordance check for `target`.
    pub fn can_offer(&self, scopes: &dyn ScopeChecker, target: &str) -> bool {
        let item = self.state.display_item();
        let Ok(workflow) = self.api.workflow_for(&item.venue) else {
            return false;
        };
        match resolve_transition(&workflow, &item.status, target) {
            Ok(transition) => can_request(scopes, &self.actor, transition, &item.venue, self.state.is_in_flight()),
            Err(_) => false,
        }
    }

    /// Request a transition and see it through.
    ///
    /// Server-side failures are not errors here: they roll the display back
    /// and surface as events. Errors are reserved for requests the client
    /// refuses to send.
    pub fn request(&mut self, target: &str) -> Result<Vec<ReconcileEvent>, ReconcileError> {
        let item = self.state.display_item();
        let workflow = self.api.executor().registry().workflow_for(&item.venue)?;
        let transition = resolve_transition(&workflow, &item.status, target)?.summary();
        self.state.submit_transition(transition)?;

        let request = TransitionRequest::new(self.state.base.id.clone(), target).with_occ(self.state.base.occ);
        let mut events = match self.api.transition(&self.actor, &request) {
            Ok(response) => self.state.on_transition_success(&response),
            Err(error) => self.state.on_transition_error(&error),
        };

        if let Some(job_id) = self.state.pending_job().map(str::to_string) {
            events.extend(self.await_job(&job_id));
        }

        self.events.extend(events.iter().cloned());
        Ok(events)
    }

    fn await_job(&mut self, job_id: &str) -> Vec<ReconcileEvent> {
        let api = self.api.clone();
        let exit = self.poller.run(
            &self.token,
            || api.job_status(job_id).map(|r| r.status),
            |status| status.is_terminal(),
            |status| debug!(job_id, %status, "job status polled"),
        );

        match exit {
            PollExit::Stopped(status) => match self.api.job_callback(job_id) {
                Ok(confirmed) => self.state.on_job_settled(job_id, status, &confirmed),
                Err(e) if e.code == ErrorCode::StaleJob => {
                    // Finalized or replaced elsewhere; show what the server has.
                    debug!(job_id, "job already settled on the server");
                    self.settle_from_server(job_id, &e.to_string())
                }
                Err(e) => {
                    warn!(job_id, error = %e, "job callback failed");
                    let events = self.state.on_transition_error(&e);
                    self.resync();
                    events
                }
            },
            PollExit::Exhausted(err) => self.give_up(job_id, &err),
            PollExit::BudgetExceeded(status) => self.give_up(job_id, &PollError::BudgetExceeded(status)),
            PollExit::Cancelled | PollExit::Disabled => Vec::new(),
        }
    }

    /// Stop waiting on `job_id` and have the server detach it, so the job
    /// finishing later cannot leave the two sides disagreeing.
    fn give_up(&mut self, job_id: &str, error: &PollError) -> Vec<ReconcileEvent> {
        let events = self.state.on_polling_exhausted(error);
        match self.api.job_abandon(job_id) {
            Ok(confirmed) => self.state.adopt_confirmed(&confirmed),
            Err(e) => {
                debug!(job_id, error = %e, "job abandon refused");
                self.resync();
            }
        }
        events
    }

    /// The job settled without our callback applying it.
    fn settle_from_server(&mut self, job_id: &str, reason: &str) -> Vec<ReconcileEvent> {
        let target = self
            .state
            .active
            .as_ref()
            .map(|a| a.transition.target_state_name.clone());
        self.resync();
        if self.state.is_in_flight() {
            return Vec::new();
        }
        match target {
            Some(target) if target == self.state.base.status => vec![ReconcileEvent::ActivityUpdated { status: target }],
            _ => {
                debug!(job_id, "job outcome not applied");
                vec![ReconcileEvent::RolledBack {
                    reason: reason.to_string(),
                }]
            }
        }
    }

    fn resync(&mut self) {
        if let Err(e) = self.refresh() {
            warn!(version_id = %self.state.base.id, error = %e, "refresh failed");
        }
    }

    /// Re-read the server copy, discarding any overlay.
    pub fn refresh(&mut self) -> Result<(), ReconcileError> {
        let base = self.api.executor().store().get(&self.state.base.id)?;
        self.state.refresh_base(base);
        Ok(())
    }

    /// Status of the job this session is waiting on, if any.
    pub fn poll_once(&mut self) -> Vec<ReconcileEvent> {
        let Some(job_id) = self.state.pending_job().map(str::to_string) else {
            return Vec::new();
        };
        match self.api.job_status(&job_id) {
            Ok(response) if response.status == JobStatus::Running => Vec::new(),
            Ok(_) => self.await_job(&job_id),
            Err(e) => {
                warn!(job_id, error = %e, "job status read failed");
                Vec::new()
            }
        }
    }
}
