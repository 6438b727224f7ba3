//! Workflow definitions
//!
//! A workflow is an immutable, venue-scoped graph of states and transitions:
//! - states carry presentation/publication flags (`authorOnly`, `inbox`,
//!   `visible`, `published`) and free-form tags
//! - transitions lead from a source state (or any state) to a target state,
//!   gated by required scopes, and may require a background job
//!
//! Workflows are loaded as [`WorkflowDraft`]s, validated once, and shared
//! read-only through a [`WorkflowRegistry`].

pub mod builtin;
mod draft;
mod registry;
mod validate;

pub use draft::WorkflowDraft;
pub use registry::{RegisteredWorkflow, RegistryBuilder, RegistryError, WorkflowRegistry};
pub use validate::{validate, validate_document, Violation, ViolationKind};

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subflow_protocol::ops::TransitionSummary;

use crate::resolve::{resolve, Resolution};

/// Name of a workflow state.
pub type StateName = String;

/// A state a submission version can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub name: StateName,
    pub label: String,
    #[serde(alias = "author_only")]
    pub author_only: bool,
    pub inbox: bool,
    pub visible: bool,
    /// Eligible for public release.
    pub published: bool,
    /// Presentation hints (`end`, `error`, `warning`, ...). No engine logic.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl State {
    /// Create a state with every flag off.
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            author_only: false,
            inbox: false,
            visible: false,
            published: false,
            tags: BTreeSet::new(),
        }
    }

    pub fn author_only(mut self) -> Self {
        self.author_only = true;
        self
    }

    pub fn inbox(mut self) -> Self {
        self.inbox = true;
        self
    }

    pub fn visible(mut self) -> Self {
        self.visible = true;
        self
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Labels shown for a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionLabels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, alias = "in_progress", skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<String>,
}

impl TransitionLabels {
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.in_progress.is_none()
    }
}

/// An edge between states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub name: String,
    /// `None` applies from any state.
    #[serde(default, alias = "source_state_name")]
    pub source_state_name: Option<StateName>,
    #[serde(alias = "target_state_name")]
    pub target_state_name: StateName,
    pub labels: TransitionLabels,
    #[serde(alias = "user_triggered")]
    pub user_triggered: bool,
    pub help: String,
    #[serde(default, alias = "required_scopes")]
    pub required_scopes: Vec<String>,
    #[serde(alias = "requires_job")]
    pub requires_job: bool,
}

impl Transition {
    /// Create a user-triggered, synchronous transition with no scopes.
    pub fn new(
        name: impl Into<String>,
        source: Option<&str>,
        target: impl Into<String>,
        action_label: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_state_name: source.map(str::to_string),
            target_state_name: target.into(),
            labels: TransitionLabels {
                action: Some(action_label.into()),
                in_progress: None,
            },
            user_triggered: true,
            help: String::new(),
            required_scopes: Vec::new(),
            requires_job: false,
        }
    }

    pub fn with_job(mut self, in_progress_label: impl Into<String>) -> Self {
        self.requires_job = true;
        self.labels.in_progress = Some(in_progress_label.into());
        self
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.required_scopes = scopes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn system_only(mut self) -> Self {
        self.user_triggered = false;
        self
    }

    /// Whether this transition applies regardless of the current state.
    pub fn is_any_state(&self) -> bool {
        self.source_state_name.is_none()
    }

    /// Whether this transition may be taken from `current`.
    pub fn applies_from(&self, current: &str) -> bool {
        match &self.source_state_name {
            Some(source) => source == current,
            None => true,
        }
    }

    /// Wire summary of this transition.
    pub fn summary(&self) -> TransitionSummary {
        TransitionSummary {
            name: self.name.clone(),
            source_state_name: self.source_state_name.clone(),
            target_state_name: self.target_state_name.clone(),
            requires_job: self.requires_job,
        }
    }
}

/// A named graph of states and transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    pub label: String,
    #[serde(alias = "initial_state")]
    pub initial_state: StateName,
    pub states: BTreeMap<StateName, State>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl Workflow {
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Look up a transition by name.
    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    /// Transitions that may be taken from `current`, in definition order.
    pub fn outgoing<'w>(&'w self, current: &'w str) -> impl Iterator<Item = &'w Transition> + 'w {
        self.transitions.iter().filter(move |t| t.applies_from(current))
    }

    /// User-triggered transitions a client may offer from `current`.
    ///
    /// One entry per reachable target: the transition the resolver would
    /// pick. Targets with ambiguous candidates are left out.
    pub fn available_transitions(&self, current: &str) -> Vec<&Transition> {
        let mut seen = BTreeSet::new();
        let mut available = Vec::new();
        for candidate in self.outgoing(current) {
            if !seen.insert(candidate.target_state_name.as_str()) {
                continue;
            }
            if let Resolution::Found(t) = resolve(self, current, &candidate.target_state_name) {
                if t.user_triggered {
                    available.push(t);
                }
            }
        }
        available
    }

    /// States with no exact-source outgoing transitions.
    pub fn is_terminal(&self, state: &str) -> bool {
        !self
            .transitions
            .iter()
            .any(|t| t.source_state_name.as_deref() == Some(state))
    }

    /// SHA-256 of the canonical JSON form (RFC 8785).
    pub fn fingerprint(&self) -> Result<String, RegistryError> {
        let jcs_bytes = serde_json_canonicalizer::to_vec(self)
            .map_err(|e| RegistryError::Fingerprint(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&jcs_bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_workflow() -> Workflow {
        let mut states = BTreeMap::new();
        for s in [
            State::new("DRAFT", "Draft").author_only(),
            State::new("IN_REVIEW", "In review").inbox(),
            State::new("PUBLISHED", "Published").visible().published().tag("end"),
            State::new("WITHDRAWN", "Withdrawn").tag("end"),
        ] {
            states.insert(s.name.clone(), s);
        }
        Workflow {
            name: "REVIEW".to_string(),
            label: "Review".to_string(),
            initial_state: "DRAFT".to_string(),
            states,
            transitions: vec![
                Transition::new("submit", Some("DRAFT"), "IN_REVIEW", "Submit"),
                Transition::new("publish", Some("IN_REVIEW"), "PUBLISHED", "Publish").with_job("Publishing"),
                Transition::new("withdraw", None, "WITHDRAWN", "Withdraw"),
                Transition::new("auto-withdraw", Some("IN_REVIEW"), "WITHDRAWN", "Withdraw").system_only(),
            ],
        }
    }

    #[test]
    fn test_applies_from() {
        let wf = review_workflow();
        assert!(wf.transition("submit").unwrap().applies_from("DRAFT"));
        assert!(!wf.transition("submit").unwrap().applies_from("IN_REVIEW"));
        assert!(wf.transition("withdraw").unwrap().applies_from("PUBLISHED"));
    }

    #[test]
    fn test_available_transitions_prefers_exact_and_filters_system() {
        let wf = review_workflow();
        let names: Vec<_> = wf
            .available_transitions("IN_REVIEW")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        // auto-withdraw wins resolution for WITHDRAWN but is not user-triggered
        assert_eq!(names, vec!["publish"]);

        let names: Vec<_> = wf
            .available_transitions("DRAFT")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["submit", "withdraw"]);
    }

    #[test]
    fn test_terminal_states() {
        let wf = review_workflow();
        assert!(!wf.is_terminal("DRAFT"));
        assert!(wf.is_terminal("PUBLISHED"));
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        let wf = review_workflow();
        let a = wf.fingerprint().unwrap();
        assert_eq!(a, wf.fingerprint().unwrap());
        assert_eq!(a.len(), 64);

        let mut changed = wf.clone();
        changed.label = "Review v2".to_string();
        assert_ne!(a, changed.fingerprint().unwrap());
    }

    #[test]
    fn test_deserialize_snake_case_aliases() {
        let json = serde_json::json!({
            "name": "W",
            "label": "W",
            "initial_state": "A",
            "states": {
                "A": { "name": "A", "label": "A", "author_only": false, "inbox": false, "visible": true, "published": false }
            },
            "transitions": [{
                "name": "loop",
                "target_state_name": "A",
                "labels": { "action": "Loop" },
                "user_triggered": true,
                "help": "",
                "requires_job": false
            }]
        });
        let wf: Workflow = serde_json::from_value(json).unwrap();
        assert_eq!(wf.initial_state, "A");
        assert!(wf.transitions[0].is_any_state());
        assert!(wf.transitions[0].required_scopes.is_empty());
    }
}
