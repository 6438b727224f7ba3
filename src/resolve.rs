//! Transition resolution
//!
//! Maps (workflow, current state, requested target) to at most one
//! transition. Exact-source candidates win over any-state candidates; two
//! candidates at the same precedence level are a configuration error and
//! are never resolved by picking one.

use tracing::debug;

use crate::error::EngineError;
use crate::workflow::{Transition, Workflow};

/// Outcome of resolving a requested target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'w> {
    Found(&'w Transition),
    NotFound,
    /// Candidates sharing the winning precedence level.
    Ambiguous(Vec<&'w Transition>),
}

impl<'w> Resolution<'w> {
    pub fn found(&self) -> Option<&'w Transition> {
        match self {
            Self::Found(t) => Some(t),
            _ => None,
        }
    }

    /// Convert to a result, keeping "not found" and "ambiguous" distinct.
    pub fn into_result(self, current: &str, target: &str) -> Result<&'w Transition, EngineError> {
        match self {
            Self::Found(t) => Ok(t),
            Self::NotFound => Err(EngineError::NoSuchTransition {
                from: current.to_string(),
                to: target.to_string(),
            }),
            Self::Ambiguous(candidates) => Err(EngineError::AmbiguousTransition {
                from: current.to_string(),
                to: target.to_string(),
                candidates: candidates.iter().map(|t| t.name.clone()).collect(),
            }),
        }
    }
}

/// Resolve the transition leading from `current` to `target`.
pub fn resolve<'w>(workflow: &'w Workflow, current: &str, target: &str) -> Resolution<'w> {
    let (exact, any): (Vec<&Transition>, Vec<&Transition>) = workflow
        .transitions
        .iter()
        .filter(|t| t.target_state_name == target && t.applies_from(current))
        .partition(|t| !t.is_any_state());

    let level = if exact.is_empty() { any } else { exact };
    let resolution = match level.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Found(level[0]),
        _ => Resolution::Ambiguous(level),
    };
    debug!(workflow = %workflow.name, current, target, ?resolution, "resolved transition");
    resolution
}

/// [`resolve`] as a result.
pub fn resolve_transition<'w>(
    workflow: &'w Workflow,
    current: &str,
    target: &str,
) -> Result<&'w Transition, EngineError> {
    resolve(workflow, current, target).into_result(current, target)
}
