//! Job poller
//!
//! Polls a job's status on a fixed interval until a caller-supplied
//! predicate says stop, the retry budget for transient failures is spent,
//! the abandonment budget runs out, or the poller is cancelled.
//!
//! [`PollSession`] holds the counting and decision logic with no threads or
//! clocks, so it can be tested deterministically. [`JobPoller`] drives a
//! session on the current thread or a spawned one.

mod budget;
mod cancel;

pub use budget::{BudgetEnforcer, BudgetStatus, BudgetValidationError, PollBudget, MAX_OVERALL_SECONDS};
pub use cancel::CancellationToken;

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

/// Poller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub enabled: bool,
    /// Poll once before the first interval elapses.
    pub poll_immediately: bool,
    /// Consecutive transient failures tolerated before giving up.
    pub num_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            enabled: true,
            poll_immediately: true,
            num_retries: 3,
        }
    }
}

impl PollerConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Fatal poller errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("polling exhausted after {attempts} consecutive failures: {last_error}")]
    PollingExhausted { attempts: u32, last_error: String },

    #[error("poll budget exceeded ({0:?})")]
    BudgetExceeded(BudgetStatus),

    #[error("poller thread panicked")]
    Panicked,
}

/// What to do after a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// Wait an interval and poll again.
    Continue,
    /// A transient failure; poll again without surfacing it.
    Retry { attempt: u32 },
    /// The predicate matched; stop.
    Stop,
    /// Retries are spent; stop with an error.
    Exhausted(PollError),
}

/// Counters and decisions for one polling run.
#[derive(Debug, Clone)]
pub struct PollSession {
    config: PollerConfig,
    polls: u64,
    consecutive_failures: u32,
    finished: bool,
}

impl PollSession {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            polls: 0,
            consecutive_failures: 0,
            finished: false,
        }
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Record a successful fetch. `stop` is the predicate's verdict.
    pub fn on_success(&mut self, stop: bool) -> PollDecision {
        self.polls += 1;
        self.consecutive_failures = 0;
        if stop {
            self.finished = true;
            PollDecision::Stop
        } else {
            PollDecision::Continue
        }
    }

    /// Record a failed fetch.
    pub fn on_failure(&mut self, error: impl fmt::Display) -> PollDecision {
        self.polls += 1;
        self.consecutive_failures += 1;
        if self.consecutive_failures > self.config.num_retries {
            self.finished = true;
            PollDecision::Exhausted(PollError::PollingExhausted {
                attempts: self.consecutive_failures,
                last_error: error.to_string(),
            })
        } else {
            PollDecision::Retry {
                attempt: self.consecutive_failures,
            }
        }
    }
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollExit<T> {
    /// The predicate matched this result.
    Stopped(T),
    Cancelled,
    /// The poller was configured off and never polled.
    Disabled,
    Exhausted(PollError),
    BudgetExceeded(BudgetStatus),
}

impl<T> PollExit<T> {
    pub fn stopped(self) -> Option<T> {
        match self {
            Self::Stopped(value) => Some(value),
            _ => None,
        }
    }
}

/// Interval poller with retry and abandonment budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobPoller {
    config: PollerConfig,
    budget: PollBudget,
}

impl JobPoller {
    pub fn new(config: PollerConfig, budget: PollBudget) -> Self {
        Self { config, budget }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll on the current thread until an exit condition.
    ///
    /// `on_result` sees every successful fetch, including the final one.
    pub fn run<T, E, F, S, R>(
        &self,
        token: &CancellationToken,
        mut fetch: F,
        mut should_stop: S,
        mut on_result: R,
    ) -> PollExit<T>
    where
        E: fmt::Display,
        F: FnMut() -> Result<T, E>,
        S: FnMut(&T) -> bool,
        R: FnMut(&T),
    {
        if !self.config.enabled {
            return PollExit::Disabled;
        }
        let mut session = PollSession::new(self.config);
        let budget = BudgetEnforcer::new(self.budget);

        if !self.config.poll_immediately && token.wait_timeout(self.config.interval) {
            return PollExit::Cancelled;
        }

        loop {
            if token.is_cancelled() {
                return PollExit::Cancelled;
            }
            let status = budget.check(session.polls());
            if status.is_exceeded() {
                debug!(?status, polls = session.polls(), "poll budget exceeded");
                return PollExit::BudgetExceeded(status);
            }

            match fetch() {
                Ok(result) => {
                    on_result(&result);
                    let stop = should_stop(&result);
                    debug!(polls = session.polls() + 1, stop, "poll tick");
                    if session.on_success(stop) == PollDecision::Stop {
                        return PollExit::Stopped(result);
                    }
                }
                Err(err) => match session.on_failure(&err) {
                    PollDecision::Exhausted(e) => {
                        warn!(error = %e, "polling exhausted");
                        return PollExit::Exhausted(e);
                    }
                    decision => warn!(error = %err, ?decision, "transient poll failure"),
                },
            }

            if token.wait_timeout(self.config.interval) {
                return PollExit::Cancelled;
            }
        }
    }

    /// Poll on a background thread.
    pub fn spawn<T, E, F, S, R>(self, fetch: F, should_stop: S, on_result: R) -> PollHandle<T>
    where
        T: Send + 'static,
        E: fmt::Display,
        F: FnMut() -> Result<T, E> + Send + 'static,
        S: FnMut(&T) -> bool + Send + 'static,
        R: FnMut(&T) + Send + 'static,
    {
        let token = CancellationToken::new();
        let thread_token = token.clone();
        let handle = thread::spawn(move || self.run(&thread_token, fetch, should_stop, on_result));
        PollHandle {
            token,
            handle: Some(handle),
        }
    }
}

/// Owner of a spawned poller. Dropping it cancels the poller.
#[derive(Debug)]
pub struct PollHandle<T> {
    token: CancellationToken,
    handle: Option<JoinHandle<PollExit<T>>>,
}

impl<T> PollHandle<T> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel immediately; an in-progress wait wakes at once.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Wait for the poller to exit.
    pub fn join(mut self) -> PollExit<T> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(PollExit::Exhausted(PollError::Panicked)),
            None => PollExit::Cancelled,
        }
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast(num_retries: u32) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(1),
            enabled: true,
            poll_immediately: true,
            num_retries,
        }
    }

    #[test]
    fn test_session_retries_then_exhausts() {
        let mut session = PollSession::new(fast(2));
        assert_eq!(session.on_failure("down"), PollDecision::Retry { attempt: 1 });
        assert_eq!(session.on_failure("down"), PollDecision::Retry { attempt: 2 });
        match session.on_failure("still down") {
            PollDecision::Exhausted(PollError::PollingExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "still down");
            }
            other => panic!("unexpected decision {:?}", other),
        }
        assert!(session.is_finished());
        assert_eq!(session.polls(), 3);
    }

    #[test]
    fn test_session_success_resets_failures() {
        let mut session = PollSession::new(fast(1));
        assert_eq!(session.on_failure("x"), PollDecision::Retry { attempt: 1 });
        assert_eq!(session.on_success(false), PollDecision::Continue);
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.on_failure("x"), PollDecision::Retry { attempt: 1 });
        assert_eq!(session.on_success(true), PollDecision::Stop);
        assert!(session.is_finished());
    }

    #[test]
    fn test_zero_retries_fails_on_first_error() {
        let mut session = PollSession::new(fast(0));
        assert!(matches!(session.on_failure("x"), PollDecision::Exhausted(_)));
    }

    #[test]
    fn test_run_stops_on_predicate() {
        let poller = JobPoller::new(fast(3), PollBudget::unlimited());
        let mut n = 0;
        let mut seen = Vec::new();
        let exit = poller.run(
            &CancellationToken::new(),
            || {
                n += 1;
                Ok::<_, String>(n)
            },
            |v| *v == 3,
            |v| seen.push(*v),
        );
        assert_eq!(exit, PollExit::Stopped(3));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_run_tolerates_transient_failures() {
        let poller = JobPoller::new(fast(2), PollBudget::unlimited());
        let mut n = 0;
        let exit = poller.run(
            &CancellationToken::new(),
            || {
                n += 1;
                if n % 3 == 0 { Ok(n) } else { Err("flaky") }
            },
            |v| *v >= 6,
            |_| {},
        );
        assert_eq!(exit, PollExit::Stopped(6));
    }

    #[test]
    fn test_run_exhausts() {
        let poller = JobPoller::new(fast(1), PollBudget::unlimited());
        let exit: PollExit<u32> = poller.run(&CancellationToken::new(), || Err("down"), |_| true, |_| {});
        assert!(matches!(exit, PollExit::Exhausted(PollError::PollingExhausted { attempts: 2, .. })));
    }

    #[test]
    fn test_disabled_never_polls() {
        let config = PollerConfig {
            enabled: false,
            ..fast(3)
        };
        let mut called = false;
        let exit: PollExit<()> = JobPoller::new(config, PollBudget::unlimited()).run(
            &CancellationToken::new(),
            || {
                called = true;
                Ok::<_, String>(())
            },
            |_| true,
            |_| {},
        );
        assert_eq!(exit, PollExit::Disabled);
        assert!(!called);
    }

    #[test]
    fn test_budget_max_polls() {
        let poller = JobPoller::new(fast(3), PollBudget::unlimited().with_max_polls(4));
        let exit = poller.run(&CancellationToken::new(), || Ok::<_, String>(0), |_| false, |_| {});
        assert_eq!(exit, PollExit::BudgetExceeded(BudgetStatus::MaxPollsExceeded));
    }

    #[test]
    fn test_spawned_poller_stops_promptly() {
        let config = PollerConfig::with_interval(Duration::from_secs(30));
        let polls = Arc::new(AtomicU32::new(0));
        let counter = polls.clone();
        let handle = JobPoller::new(config, PollBudget::unlimited()).spawn(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            },
            |_| false,
            |_| {},
        );
        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        handle.stop();
        assert_eq!(handle.join(), PollExit::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delayed_first_poll() {
        let config = PollerConfig {
            poll_immediately: false,
            interval: Duration::from_millis(15),
            ..fast(0)
        };
        let start = Instant::now();
        let exit = JobPoller::new(config, PollBudget::unlimited()).run(
            &CancellationToken::new(),
            || Ok::<_, String>(start.elapsed()),
            |_| true,
            |_| {},
        );
        assert!(exit.stopped().unwrap() >= Duration::from_millis(15));
    }
}
