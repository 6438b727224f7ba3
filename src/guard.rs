//! Guard evaluation
//!
//! An actor may take a transition iff they hold every required scope in the
//! venue, or hold the unscoped system-admin capability. The same check runs
//! client-side (advisory) and server-side (authoritative).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::workflow::Transition;

/// Whoever requests a transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The engine itself (job finalization, abandonment).
    pub fn system() -> Self {
        Self::new("system")
    }
}

/// Scope-check collaborator.
pub trait ScopeChecker: Send + Sync {
    fn has_scope(&self, actor: &Actor, scope: &str, venue: &str) -> bool;

    /// Unscoped administrative capability that bypasses required scopes.
    fn is_system_admin(&self, actor: &Actor) -> bool;
}

/// Whether `actor` may take `transition` in `venue`.
pub fn is_allowed(checker: &dyn ScopeChecker, actor: &Actor, transition: &Transition, venue: &str) -> bool {
    checker.is_system_admin(actor)
        || transition
            .required_scopes
            .iter()
            .all(|scope| checker.has_scope(actor, scope, venue))
}

/// Client-side affordance check: an in-flight transition blocks any other.
pub fn can_request(
    checker: &dyn ScopeChecker,
    actor: &Actor,
    transition: &Transition,
    venue: &str,
    in_flight: bool,
) -> bool {
    !in_flight && transition.user_triggered && is_allowed(checker, actor, transition, venue)
}

/// In-memory grants, keyed by actor then venue.
#[derive(Debug, Clone, Default)]
pub struct StaticScopes {
    grants: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    admins: BTreeSet<String>,
}

impl StaticScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, actor: &str, venue: &str, scope: &str) -> Self {
        self.grants
            .entry(actor.to_string())
            .or_default()
            .entry(venue.to_string())
            .or_default()
            .insert(scope.to_string());
        self
    }

    pub fn admin(mut self, actor: &str) -> Self {
        self.admins.insert(actor.to_string());
        self
    }
}

impl ScopeChecker for StaticScopes {
    fn has_scope(&self, actor: &Actor, scope: &str, venue: &str) -> bool {
        self.grants
            .get(&actor.id)
            .and_then(|venues| venues.get(venue))
            .map(|scopes| scopes.contains(scope))
            .unwrap_or(false)
    }

    fn is_system_admin(&self, actor: &Actor) -> bool {
        self.admins.contains(&actor.id)
    }
}
