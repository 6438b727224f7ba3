//! Finalize and abandon steps for job-linked transitions.

use subflow_protocol::JobStatus;
use tracing::info;

use super::{publish_date, TransitionExecutor};
use crate::error::EngineError;
use crate::guard::Actor;
use crate::notify::events;
use crate::runner::JobRunner;
use crate::store::{ActivityType, Commit, JobChange, JobLink, SubmissionVersion, VersionStore};

/// What [`TransitionExecutor::finalize`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The job has not finished; nothing changed.
    StillRunning(SubmissionVersion),
    /// The job completed and the target status was applied.
    Applied(SubmissionVersion),
    /// The job failed; the job was detached and the status left unchanged.
    Abandoned(SubmissionVersion),
}

impl FinalizeOutcome {
    pub fn version(&self) -> &SubmissionVersion {
        match self {
            Self::StillRunning(v) | Self::Applied(v) | Self::Abandoned(v) => v,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::StillRunning(_))
    }
}

impl TransitionExecutor {
    /// Look up the job's link and the version it is still attached to.
    fn attached(&self, job_id: &str) -> Result<(JobLink, SubmissionVersion), EngineError> {
        let link = self
            .store
            .job_link(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        let version = self.store.get(&link.version_id)?;
        if version.job_id.as_deref() != Some(job_id) {
            return Err(EngineError::StaleJob {
                job_id: job_id.to_string(),
                version_id: version.id,
            });
        }
        Ok((link, version))
    }

    /// Apply a linked job's outcome to its version.
    ///
    /// The runner is asked for the authoritative status: `COMPLETED` applies
    /// the target state, `FAILED` abandons, `RUNNING` changes nothing.
    pub fn finalize(&self, job_id: &str) -> Result<FinalizeOutcome, EngineError> {
        let (link, version) = self.attached(job_id)?;
        match self.runner.job_status(job_id)? {
            JobStatus::Running => Ok(FinalizeOutcome::StillRunning(version)),
            JobStatus::Failed => self.abandon(job_id).map(FinalizeOutcome::Abandoned),
            JobStatus::Completed => self.apply_completed(&link, &version).map(FinalizeOutcome::Applied),
        }
    }

    fn apply_completed(&self, link: &JobLink, version: &SubmissionVersion) -> Result<SubmissionVersion, EngineError> {
        let workflow = self.registry.workflow_for(&version.venue)?;
        let date_published = publish_date(&workflow, &link.target_state_name, link.date_override);

        let (updated, _) = self.store.transact(&version.id, version.occ, &mut |current| {
            if current.job_id.as_deref() != Some(link.job_id.as_str()) {
                return Err(EngineError::StaleJob {
                    job_id: link.job_id.clone(),
                    version_id: current.id.clone(),
                });
            }
            Ok(Commit {
                status: Some(link.target_state_name.clone()),
                job: JobChange::Detach,
                date_published,
                activity_type: ActivityType::JobCompleted,
                actor: link.requested_by.clone(),
            })
        })?;

        info!(
            version_id = %updated.id,
            job_id = %link.job_id,
            target = %updated.status,
            occ = updated.occ,
            "job completed, transition finalized"
        );
        self.notify(events::JOB_COMPLETED, &updated, &link.transition);
        if version.date_published.is_none() && updated.date_published.is_some() {
            self.notify(events::PUBLISHED, &updated, &link.transition);
        }
        Ok(updated)
    }

    /// Detach a job without applying its target.
    ///
    /// Used when the job failed or the caller's poll budget ran out. The
    /// status is left unchanged; `occ` is incremented.
    pub fn abandon(&self, job_id: &str) -> Result<SubmissionVersion, EngineError> {
        let (link, version) = self.attached(job_id)?;
        let (updated, _) = self.store.transact(&version.id, version.occ, &mut |_| {
            Ok(Commit {
                status: None,
                job: JobChange::Detach,
                date_published: None,
                activity_type: ActivityType::JobAbandoned,
                actor: Actor::system().id,
            })
        })?;

        info!(
            version_id = %updated.id,
            job_id = %job_id,
            status = %updated.status,
            occ = updated.occ,
            "job abandoned"
        );
        self.notify(events::JOB_ABANDONED, &updated, &link.transition);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecuteOptions;
    use crate::store::ActivityLog;
    use crate::testing::{author, editor, Harness, JOURNAL, PREPRINTS};
    use chrono::{TimeZone, Utc};

    /// SIMPLE version in IN_REVIEW with a running publish job.
    fn pending(h: &Harness, opts: &ExecuteOptions) -> (SubmissionVersion, String) {
        let v = h.version(PREPRINTS);
        h.executor
            .execute(&author(), &v.id, "IN_REVIEW", &ExecuteOptions::default())
            .unwrap();
        let out = h.executor.execute(&author(), &v.id, "PUBLISHED", opts).unwrap();
        (out.version, out.job_id.unwrap())
    }

    #[test]
    fn test_running_job_changes_nothing() {
        let h = Harness::new();
        let (v, job_id) = pending(&h, &ExecuteOptions::default());
        let outcome = h.executor.finalize(&job_id).unwrap();
        assert_eq!(outcome, FinalizeOutcome::StillRunning(v.clone()));
        assert!(!outcome.is_settled());
        assert_eq!(h.reload(&v), v);
    }

    #[test]
    fn test_completed_applies_target_and_stamps_date() {
        let h = Harness::new();
        let (v, job_id) = pending(&h, &ExecuteOptions::default());
        h.runner.set_job_status(&job_id, JobStatus::Completed);

        let before = Utc::now();
        let outcome = h.executor.finalize(&job_id).unwrap();
        let applied = outcome.version().clone();
        assert!(matches!(outcome, FinalizeOutcome::Applied(_)));
        assert_eq!(applied.status, "PUBLISHED");
        assert!(applied.job_id.is_none());
        assert_eq!(applied.occ, v.occ + 1);
        assert!(applied.date_published.unwrap() >= before);

        let activity = h.activity.list("sub-1");
        assert_eq!(activity[0].activity_type, ActivityType::JobCompleted);
        assert_eq!(activity[0].activity_by, "author");
        assert_eq!(activity.len(), 3);
        assert!(h.notifier.event_types().contains(&events::PUBLISHED.to_string()));
    }

    #[test]
    fn test_completed_uses_date_override() {
        let h = Harness::new();
        let date = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let opts = ExecuteOptions {
            date: Some(date),
            ..Default::default()
        };
        let (_, job_id) = pending(&h, &opts);
        h.runner.set_job_status(&job_id, JobStatus::Completed);
        let outcome = h.executor.finalize(&job_id).unwrap();
        assert_eq!(outcome.version().date_published, Some(date));
    }

    #[test]
    fn test_failed_job_abandons() {
        let h = Harness::new();
        let (v, job_id) = pending(&h, &ExecuteOptions::default());
        h.runner.set_job_status(&job_id, JobStatus::Failed);

        let outcome = h.executor.finalize(&job_id).unwrap();
        let version = outcome.version();
        assert!(matches!(outcome, FinalizeOutcome::Abandoned(_)));
        assert_eq!(version.status, "IN_REVIEW");
        assert!(version.job_id.is_none());
        assert_eq!(version.occ, v.occ + 1);
        assert_eq!(h.activity.list("sub-1")[0].activity_type, ActivityType::JobAbandoned);
    }

    #[test]
    fn test_second_finalize_is_stale() {
        let h = Harness::new();
        let (_, job_id) = pending(&h, &ExecuteOptions::default());
        h.runner.set_job_status(&job_id, JobStatus::Completed);
        h.executor.finalize(&job_id).unwrap();
        let err = h.executor.finalize(&job_id).unwrap_err();
        assert!(matches!(err, EngineError::StaleJob { .. }));
        assert_eq!(h.activity.list("sub-1").len(), 3);
    }

    #[test]
    fn test_sync_transition_supersedes_pending_job() {
        let h = Harness::new();
        let v = h.version(JOURNAL);
        let opts = ExecuteOptions::default();
        h.executor.execute(&author(), &v.id, "IN_REVIEW", &opts).unwrap();
        h.executor.execute(&editor(), &v.id, "ACCEPTED", &opts).unwrap();
        let job_id = h
            .executor
            .execute(&editor(), &v.id, "PUBLISHED", &opts)
            .unwrap()
            .job_id
            .unwrap();

        let withdrawn = h.executor.execute(&author(), &v.id, "WITHDRAWN", &opts).unwrap();
        assert!(withdrawn.version.job_id.is_none());

        h.runner.set_job_status(&job_id, JobStatus::Completed);
        assert!(matches!(h.executor.finalize(&job_id), Err(EngineError::StaleJob { .. })));
        assert_eq!(h.reload(&v).status, "WITHDRAWN");
    }

    #[test]
    fn test_unknown_job() {
        let h = Harness::new();
        assert_eq!(
            h.executor.finalize("job-missing").unwrap_err(),
            EngineError::JobNotFound("job-missing".to_string())
        );
        assert!(h.executor.abandon("job-missing").is_err());
    }

    #[test]
    fn test_abandon_running_job() {
        let h = Harness::new();
        let (v, job_id) = pending(&h, &ExecuteOptions::default());
        let abandoned = h.executor.abandon(&job_id).unwrap();
        assert_eq!(abandoned.status, v.status);
        assert!(abandoned.job_id.is_none());
        assert!(h.notifier.event_types().contains(&events::JOB_ABANDONED.to_string()));
    }
}
