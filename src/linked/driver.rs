//! Drives a pending job-linked transition to completion.

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};

use subflow_protocol::JobStatus;
use tracing::{info, warn};

use super::{LinkedError, LinkedTransition};
use crate::error::EngineError;
use crate::executor::{FinalizeOutcome, TransitionExecutor};
use crate::poller::{BudgetStatus, CancellationToken, JobPoller, PollBudget, PollError, PollExit, PollerConfig};
use crate::runner::JobRunner;
use crate::store::{SubmissionVersion, VersionStore};

/// Attempts at finalize when it loses an `occ` race.
const FINALIZE_ATTEMPTS: u32 = 3;

/// Why a job-linked transition was abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    JobFailed,
    PollingExhausted(PollError),
    BudgetExceeded(BudgetStatus),
}

/// How a driven transition ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkedOutcome {
    /// The target status was applied.
    Applied(SubmissionVersion),
    /// The job was detached; the status is unchanged.
    Abandoned {
        version: SubmissionVersion,
        reason: AbandonReason,
    },
    /// Another transition detached the job first.
    Superseded,
    /// Observation stopped (cancelled or disabled); the job is still attached.
    StillPending,
}

/// Outcome plus the protocol record.
#[derive(Debug, Clone)]
pub struct LinkedReport {
    pub outcome: LinkedOutcome,
    pub transition: LinkedTransition,
}

/// Polls a linked job and applies its outcome through the executor.
#[derive(Clone)]
pub struct JobLinkedDriver {
    executor: TransitionExecutor,
    config: PollerConfig,
    default_budget: PollBudget,
    /// Budgets by job type (the transition name).
    budgets: BTreeMap<String, PollBudget>,
}

impl JobLinkedDriver {
    pub fn new(executor: TransitionExecutor, config: PollerConfig, default_budget: PollBudget) -> Self {
        Self {
            executor,
            config,
            default_budget,
            budgets: BTreeMap::new(),
        }
    }

    pub fn with_job_type_budget(mut self, job_type: impl Into<String>, budget: PollBudget) -> Self {
        self.budgets.insert(job_type.into(), budget);
        self
    }

    pub fn budget_for(&self, job_type: &str) -> PollBudget {
        self.budgets.get(job_type).copied().unwrap_or(self.default_budget)
    }

    /// Poll `job_id` until it settles, the budget runs out, or `token` is
    /// cancelled, then finalize or abandon.
    pub fn observe(&self, token: &CancellationToken, job_id: &str) -> Result<LinkedReport, EngineError> {
        let store = self.executor.store();
        let link = store
            .job_link(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        let version = store.get(&link.version_id)?;
        if version.job_id.as_deref() != Some(job_id) {
            return Err(EngineError::StaleJob {
                job_id: job_id.to_string(),
                version_id: version.id,
            });
        }

        let mut record = LinkedTransition::new(version.id.clone(), version.status.clone());
        advance(record.start(job_id));

        let poller = JobPoller::new(self.config, self.budget_for(&link.transition));
        let runner = self.executor.runner().clone();
        let exit = poller.run(
            token,
            || runner.job_status(job_id),
            |status| status.is_terminal(),
            |_| {},
        );

        let outcome = match exit {
            PollExit::Stopped(JobStatus::Completed) => {
                advance(record.begin_finalize());
                self.finalize(job_id, &mut record)?
            }
            PollExit::Stopped(_) => self.finalize(job_id, &mut record)?,
            PollExit::Exhausted(err) => self.abandon(job_id, &mut record, AbandonReason::PollingExhausted(err))?,
            PollExit::BudgetExceeded(status) => {
                self.abandon(job_id, &mut record, AbandonReason::BudgetExceeded(status))?
            }
            PollExit::Cancelled | PollExit::Disabled => LinkedOutcome::StillPending,
        };

        Ok(LinkedReport {
            outcome,
            transition: record,
        })
    }

    fn finalize(&self, job_id: &str, record: &mut LinkedTransition) -> Result<LinkedOutcome, EngineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.executor.finalize(job_id) {
                Ok(FinalizeOutcome::Applied(version)) => {
                    advance(record.complete(version.status.clone()));
                    return Ok(LinkedOutcome::Applied(version));
                }
                Ok(FinalizeOutcome::Abandoned(version)) => {
                    advance(record.abandon());
                    return Ok(LinkedOutcome::Abandoned {
                        version,
                        reason: AbandonReason::JobFailed,
                    });
                }
                Ok(FinalizeOutcome::StillRunning(_)) => return Ok(LinkedOutcome::StillPending),
                Err(EngineError::StaleJob { .. }) => {
                    advance(record.abandon());
                    return Ok(LinkedOutcome::Superseded);
                }
                Err(err @ EngineError::ConcurrentModification { .. }) if attempt < FINALIZE_ATTEMPTS => {
                    warn!(job_id, attempt, error = %err, "finalize lost occ race, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn abandon(
        &self,
        job_id: &str,
        record: &mut LinkedTransition,
        reason: AbandonReason,
    ) -> Result<LinkedOutcome, EngineError> {
        info!(job_id, ?reason, "abandoning job-linked transition");
        match self.executor.abandon(job_id) {
            Ok(version) => {
                advance(record.abandon());
                Ok(LinkedOutcome::Abandoned { version, reason })
            }
            Err(EngineError::StaleJob { .. }) => {
                advance(record.abandon());
                Ok(LinkedOutcome::Superseded)
            }
            Err(err) => Err(err),
        }
    }

    /// Observe on a background thread.
    pub fn spawn(&self, job_id: impl Into<String>) -> DriverHandle {
        let token = CancellationToken::new();
        let driver = self.clone();
        let job_id = job_id.into();
        let thread_token = token.clone();
        let handle = thread::spawn(move || driver.observe(&thread_token, &job_id));
        DriverHandle { token, handle }
    }
}

fn advance(result: Result<(), LinkedError>) {
    if let Err(err) = result {
        warn!(error = %err, "job-linked record out of step");
    }
}

/// A background observation.
pub struct DriverHandle {
    token: CancellationToken,
    handle: JoinHandle<Result<LinkedReport, EngineError>>,
}

impl DriverHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn join(self) -> Result<LinkedReport, EngineError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(EngineError::configuration("job-linked driver panicked")))
    }
}
