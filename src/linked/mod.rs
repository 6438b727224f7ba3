//! Job-linked transition protocol
//!
//! Phases: IDLE → PENDING(job) → {FINALIZING → IDLE(new status) |
//! ABANDONED → IDLE(old status)}
//!
//! [`LinkedTransition`] records one pass through the protocol; the
//! [`JobLinkedDriver`] moves it along by polling the job and invoking the
//! executor's finalize and abandon steps. The persisted version is the
//! source of truth; this record only mirrors it.

mod driver;

pub use driver::{AbandonReason, DriverHandle, JobLinkedDriver, LinkedOutcome, LinkedReport};

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

static SEQUENCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Next sequence number for ordering phase changes.
pub fn next_seq() -> u64 {
    SEQUENCE_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkedPhase {
    /// No job-linked transition in flight.
    Idle,
    /// A job is attached; the status is unchanged.
    Pending,
    /// The job completed; the target status is being applied.
    Finalizing,
    /// The job failed or ran out of budget; the job is being detached.
    Abandoned,
}

impl LinkedPhase {
    pub fn can_transition_to(&self, target: LinkedPhase) -> bool {
        match (self, target) {
            (LinkedPhase::Idle, LinkedPhase::Pending) => true,

            (LinkedPhase::Pending, LinkedPhase::Finalizing) => true,
            (LinkedPhase::Pending, LinkedPhase::Abandoned) => true,

            (LinkedPhase::Finalizing, LinkedPhase::Idle) => true,
            // Finalize found the job failed or superseded
            (LinkedPhase::Finalizing, LinkedPhase::Abandoned) => true,

            (LinkedPhase::Abandoned, LinkedPhase::Idle) => true,

            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkedError {
    #[error("Invalid phase transition from {from:?} to {to:?}")]
    InvalidTransition { from: LinkedPhase, to: LinkedPhase },
}

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub from: LinkedPhase,
    pub to: LinkedPhase,
    pub at: DateTime<Utc>,
    pub seq: u64,
}

/// A job-linked transition's progress through the protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedTransition {
    pub version_id: String,
    /// Status before the transition; restored on abandon.
    pub original_status: String,
    pub job_id: Option<String>,
    pub phase: LinkedPhase,
    /// Status once back in IDLE.
    pub final_status: Option<String>,
    pub history: Vec<PhaseChange>,
    pub seq: u64,
}

impl LinkedTransition {
    pub fn new(version_id: impl Into<String>, original_status: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            original_status: original_status.into(),
            job_id: None,
            phase: LinkedPhase::Idle,
            final_status: None,
            history: Vec::new(),
            seq: next_seq(),
        }
    }

    fn transition(&mut self, to: LinkedPhase) -> Result<(), LinkedError> {
        if !self.phase.can_transition_to(to) {
            return Err(LinkedError::InvalidTransition { from: self.phase, to });
        }
        self.seq = next_seq();
        self.history.push(PhaseChange {
            from: self.phase,
            to,
            at: Utc::now(),
            seq: self.seq,
        });
        self.phase = to;
        Ok(())
    }

    /// IDLE → PENDING
    pub fn start(&mut self, job_id: impl Into<String>) -> Result<(), LinkedError> {
        self.transition(LinkedPhase::Pending)?;
        self.job_id = Some(job_id.into());
        Ok(())
    }

    /// PENDING → FINALIZING
    pub fn begin_finalize(&mut self) -> Result<(), LinkedError> {
        self.transition(LinkedPhase::Finalizing)
    }

    /// FINALIZING → IDLE with the applied status.
    pub fn complete(&mut self, new_status: impl Into<String>) -> Result<(), LinkedError> {
        self.transition(LinkedPhase::Idle)?;
        self.final_status = Some(new_status.into());
        self.job_id = None;
        Ok(())
    }

    /// → ABANDONED → IDLE with the original status.
    pub fn abandon(&mut self) -> Result<(), LinkedError> {
        self.transition(LinkedPhase::Abandoned)?;
        self.transition(LinkedPhase::Idle)?;
        self.final_status = Some(self.original_status.clone());
        self.job_id = None;
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.phase == LinkedPhase::Pending
    }

    /// Phases visited, in order, starting with IDLE.
    pub fn phases(&self) -> Vec<LinkedPhase> {
        let mut phases = vec![LinkedPhase::Idle];
        phases.extend(self.history.iter().map(|c| c.to));
        phases
    }
}
