//! Job-Linked Protocol Tests
//!
//! IDLE -> PENDING(job) -> {FINALIZING -> IDLE(new) | ABANDONED -> IDLE(old)},
//! driven by polling the simulated runner.

mod fixtures;

use std::time::Duration;

use fixtures::{author, editor, fast_poller, held_runner, Engine, JOURNAL, PREPRINTS};
use serde_json::json;
use subflow::linked::{AbandonReason, LinkedPhase};
use subflow::poller::BudgetStatus;
use subflow::store::{ActivityLog, ActivityType};
use subflow::{
    dispatch, CancellationToken, EngineError, ExecuteOptions, JobLinkedDriver, LinkedOutcome, PollBudget,
    SubmissionVersion, VersionStore,
};
use subflow_protocol::ops::names;
use subflow_protocol::{ApiRequest, ErrorCode, JobStatus};
use subflow_runner::{FailureInjection, RunnerConfig, RunnerState};

/// SIMPLE version in IN_REVIEW with a publish job attached.
fn start_publish(engine: &Engine) -> (SubmissionVersion, String) {
    let v = engine.version(PREPRINTS);
    engine
        .executor
        .execute(&author(), &v.id, "IN_REVIEW", &ExecuteOptions::default())
        .unwrap();
    let outcome = engine
        .executor
        .execute(&author(), &v.id, "PUBLISHED", &ExecuteOptions::default())
        .unwrap();
    let job_id = outcome.job_id.expect("job started");
    (engine.reload(&v), job_id)
}

fn driver(engine: &Engine, budget: PollBudget) -> JobLinkedDriver {
    JobLinkedDriver::new(engine.executor.clone(), fast_poller(), budget)
}

// =============================================================================
// Driver outcomes
// =============================================================================

#[test]
fn test_completed_job_applies_target() {
    let engine = Engine::timed(20);
    let (pending, job_id) = start_publish(&engine);
    assert_eq!(pending.status, "IN_REVIEW");

    let report = driver(&engine, PollBudget::default())
        .observe(&CancellationToken::new(), &job_id)
        .unwrap();

    match &report.outcome {
        LinkedOutcome::Applied(v) => {
            assert_eq!(v.status, "PUBLISHED");
            assert!(v.job_id.is_none());
            assert!(v.date_published.is_some());
        }
        other => panic!("expected applied, got {:?}", other),
    }
    assert_eq!(
        report.transition.phases(),
        vec![LinkedPhase::Idle, LinkedPhase::Pending, LinkedPhase::Finalizing, LinkedPhase::Idle]
    );
    assert_eq!(report.transition.final_status.as_deref(), Some("PUBLISHED"));
}

#[test]
fn test_failed_job_leaves_status_and_clears_job() {
    let runner = RunnerState::new(RunnerConfig::with_delay(Duration::from_millis(10)));
    runner.set_failure_injection(FailureInjection {
        force_outcome: Some(JobStatus::Failed),
        ..FailureInjection::default()
    });
    let engine = Engine::new(runner);
    let (pending, job_id) = start_publish(&engine);

    let report = driver(&engine, PollBudget::default())
        .observe(&CancellationToken::new(), &job_id)
        .unwrap();

    match &report.outcome {
        LinkedOutcome::Abandoned { version, reason } => {
            assert_eq!(version.status, "IN_REVIEW");
            assert!(version.job_id.is_none());
            assert!(version.date_published.is_none());
            assert_eq!(version.occ, pending.occ + 1);
            assert_eq!(*reason, AbandonReason::JobFailed);
        }
        other => panic!("expected abandoned, got {:?}", other),
    }
    assert_eq!(
        report.transition.phases(),
        vec![LinkedPhase::Idle, LinkedPhase::Pending, LinkedPhase::Abandoned, LinkedPhase::Idle]
    );
    assert_eq!(report.transition.final_status.as_deref(), Some("IN_REVIEW"));

    let latest = engine.activity.list("sub-1");
    assert_eq!(latest[0].activity_type, ActivityType::JobAbandoned);
    assert_eq!(latest[0].activity_by, "system");
}

#[test]
fn test_budget_exhaustion_abandons() {
    let engine = Engine::held();
    let (_, job_id) = start_publish(&engine);

    let driver = driver(&engine, PollBudget::default())
        .with_job_type_budget("publish", PollBudget::unlimited().with_max_polls(2));
    let report = driver.observe(&CancellationToken::new(), &job_id).unwrap();

    match report.outcome {
        LinkedOutcome::Abandoned { version, reason } => {
            assert_eq!(version.status, "IN_REVIEW");
            assert!(version.job_id.is_none());
            assert_eq!(reason, AbandonReason::BudgetExceeded(BudgetStatus::MaxPollsExceeded));
        }
        other => panic!("expected abandoned, got {:?}", other),
    }
}

#[test]
fn test_polling_exhaustion_abandons() {
    let runner = held_runner();
    runner.set_failure_injection(FailureInjection {
        hold_jobs: true,
        status_failures: 100,
        ..FailureInjection::default()
    });
    let engine = Engine::new(runner);
    let (_, job_id) = start_publish(&engine);

    let report = driver(&engine, PollBudget::default())
        .observe(&CancellationToken::new(), &job_id)
        .unwrap();

    match report.outcome {
        LinkedOutcome::Abandoned {
            reason: AbandonReason::PollingExhausted(_),
            version,
        } => assert!(version.job_id.is_none()),
        other => panic!("expected polling exhaustion, got {:?}", other),
    }
}

#[test]
fn test_transient_status_failures_are_retried() {
    let runner = RunnerState::new(RunnerConfig::with_delay(Duration::from_millis(10)));
    runner.set_failure_injection(FailureInjection {
        status_failures: 2,
        ..FailureInjection::default()
    });
    let engine = Engine::new(runner);
    let (_, job_id) = start_publish(&engine);

    let report = driver(&engine, PollBudget::default())
        .observe(&CancellationToken::new(), &job_id)
        .unwrap();
    assert!(matches!(report.outcome, LinkedOutcome::Applied(_)));
}

#[test]
fn test_cancelled_observation_leaves_job_pending() {
    let engine = Engine::held();
    let (pending, job_id) = start_publish(&engine);

    let handle = driver(&engine, PollBudget::unlimited()).spawn(job_id.clone());
    std::thread::sleep(Duration::from_millis(20));
    handle.cancel();
    let report = handle.join().unwrap();

    assert_eq!(report.outcome, LinkedOutcome::StillPending);
    assert!(report.transition.is_pending());
    let current = engine.reload(&pending);
    assert_eq!(current.job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(current.occ, pending.occ);
}

#[test]
fn test_second_request_replaces_running_job() {
    let engine = Engine::held();
    let (pending, job_id) = start_publish(&engine);

    let second = engine
        .executor
        .execute(&author(), &pending.id, "PUBLISHED", &ExecuteOptions::default())
        .unwrap();
    let replacement = second.job_id.unwrap();
    assert_ne!(replacement, job_id);

    // The first job finishing late must not publish the version
    engine.runner.set_job_status(&job_id, JobStatus::Completed);
    let err = engine.executor.finalize(&job_id).unwrap_err();
    assert!(matches!(err, EngineError::StaleJob { .. }));
    assert_eq!(err.code(), ErrorCode::StaleJob);
    assert_eq!(engine.reload(&pending).status, "IN_REVIEW");

    let report = driver(&engine, PollBudget::default()).observe(&CancellationToken::new(), &job_id);
    assert!(matches!(report, Err(EngineError::StaleJob { .. })));
}

#[test]
fn test_direct_transition_supersedes_running_job() {
    let engine = Engine::held();
    let v = engine.version(JOURNAL);
    for (actor, target) in [(author(), "IN_REVIEW"), (editor(), "ACCEPTED")] {
        engine
            .executor
            .execute(&actor, &v.id, target, &ExecuteOptions::default())
            .unwrap();
    }
    let job_id = engine
        .executor
        .execute(&editor(), &v.id, "PUBLISHED", &ExecuteOptions::default())
        .unwrap()
        .job_id
        .unwrap();

    let withdrawn = engine
        .executor
        .execute(&author(), &v.id, "WITHDRAWN", &ExecuteOptions::default())
        .unwrap();
    assert_eq!(withdrawn.version.status, "WITHDRAWN");
    assert!(withdrawn.version.job_id.is_none());

    engine.runner.set_job_status(&job_id, JobStatus::Completed);
    let handle = driver(&engine, PollBudget::default()).spawn(job_id.clone());
    assert!(matches!(handle.join(), Err(EngineError::StaleJob { .. })));
    assert_eq!(engine.reload(&v).status, "WITHDRAWN");
}

#[test]
fn test_unknown_job() {
    let engine = Engine::held();
    let err = engine.executor.finalize("job-missing").unwrap_err();
    assert_eq!(err, EngineError::JobNotFound("job-missing".to_string()));
    assert_eq!(err.code().http_status(), 404);
}

// =============================================================================
// Over the envelope API
// =============================================================================

#[test]
fn test_protocol_over_envelopes() {
    let engine = Engine::held();
    let v = engine.version(PREPRINTS);

    let send = |op: &str, payload: serde_json::Value| {
        dispatch(&engine.api, &ApiRequest::new(op, "req", payload).with_actor("author"))
    };

    let submitted = send(names::TRANSITION, json!({"submissionVersionId": v.id, "targetStatus": "IN_REVIEW"}));
    assert!(submitted.ok);

    let started = send(names::TRANSITION, json!({"submissionVersionId": v.id, "targetStatus": "PUBLISHED"}));
    let payload = started.payload.unwrap();
    assert_eq!(payload["status"], "IN_REVIEW");
    let job_id = payload["jobId"].as_str().unwrap().to_string();

    let polled = send(names::JOB_STATUS, json!({"job_id": job_id}));
    assert_eq!(polled.payload.unwrap()["status"], "RUNNING");

    engine.runner.set_job_status(&job_id, JobStatus::Completed);
    let polled = send(names::JOB_STATUS, json!({"job_id": job_id}));
    assert_eq!(polled.payload.unwrap()["status"], "COMPLETED");

    let finalized = send(names::JOB_CALLBACK, json!({"job_id": job_id}));
    let payload = finalized.payload.unwrap();
    assert_eq!(payload["status"], "PUBLISHED");
    assert!(payload.get("jobId").is_none());

    // A second callback finds the job already detached
    let repeated = send(names::JOB_CALLBACK, json!({"job_id": job_id}));
    assert!(!repeated.ok);
    assert_eq!(repeated.error.unwrap().code, ErrorCode::StaleJob);
}
