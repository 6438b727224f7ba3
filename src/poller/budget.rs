//! Poll budget
//!
//! The caller-configurable abandonment budget for a job-linked transition:
//! - `overall`: maximum wall-clock time spent polling
//! - `max_polls`: maximum number of status reads
//!
//! The enforcer only reports; the caller decides to abandon.

use std::time::{Duration, Instant};

/// Largest allowed overall budget (one day).
pub const MAX_OVERALL_SECONDS: u64 = 86_400;

/// Budget configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub overall: Option<Duration>,
    pub max_polls: Option<u64>,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            overall: Some(Duration::from_secs(600)),
            max_polls: None,
        }
    }
}

impl PollBudget {
    pub fn unlimited() -> Self {
        Self {
            overall: None,
            max_polls: None,
        }
    }

    pub fn with_overall(mut self, overall: Duration) -> Self {
        self.overall = Some(overall);
        self
    }

    pub fn with_max_polls(mut self, max_polls: u64) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    pub fn validate(&self) -> Result<(), BudgetValidationError> {
        if let Some(overall) = self.overall {
            if overall.is_zero() || overall > Duration::from_secs(MAX_OVERALL_SECONDS) {
                return Err(BudgetValidationError::OverallOutOfBounds {
                    value: overall.as_secs(),
                });
            }
        }
        if self.max_polls == Some(0) {
            return Err(BudgetValidationError::ZeroPolls);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetValidationError {
    #[error("overall_seconds must be in (0, 86400], got {value}")]
    OverallOutOfBounds { value: u64 },

    #[error("max_polls must be greater than 0")]
    ZeroPolls,
}

/// Budget check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Ok,
    OverallExceeded,
    MaxPollsExceeded,
}

impl BudgetStatus {
    pub fn is_exceeded(&self) -> bool {
        !matches!(self, BudgetStatus::Ok)
    }
}

/// Tracks elapsed time against a [`PollBudget`].
#[derive(Debug)]
pub struct BudgetEnforcer {
    budget: PollBudget,
    start_time: Instant,
}

impl BudgetEnforcer {
    pub fn new(budget: PollBudget) -> Self {
        Self {
            budget,
            start_time: Instant::now(),
        }
    }

    /// Check before issuing poll number `polls + 1`.
    pub fn check(&self, polls: u64) -> BudgetStatus {
        if let Some(overall) = self.budget.overall {
            if self.start_time.elapsed() > overall {
                return BudgetStatus::OverallExceeded;
            }
        }
        if let Some(max) = self.budget.max_polls {
            if polls >= max {
                return BudgetStatus::MaxPollsExceeded;
            }
        }
        BudgetStatus::Ok
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before the overall budget runs out.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .overall
            .map(|overall| overall.saturating_sub(self.start_time.elapsed()))
    }
}
