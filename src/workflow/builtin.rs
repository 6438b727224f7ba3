//! Built-in workflows
//!
//! `SIMPLE` is the smallest useful review flow. `DEFAULT` adds an editorial
//! decision, a job-linked publish, and any-state escape hatches. Both are
//! also shipped as TOML under `workflows/` and must stay in sync.

use std::collections::BTreeMap;

use super::{State, Transition, Workflow};

pub const SIMPLE: &str = "SIMPLE";
pub const DEFAULT: &str = "DEFAULT";

/// Scope required for editorial decisions.
pub const SCOPE_EDITOR: &str = "submission:review";
/// Scope required to publish.
pub const SCOPE_PUBLISH: &str = "submission:publish";

fn states(list: Vec<State>) -> BTreeMap<String, State> {
    list.into_iter().map(|s| (s.name.clone(), s)).collect()
}

/// DRAFT → IN_REVIEW (sync) → PUBLISHED (job-linked).
pub fn simple() -> Workflow {
    Workflow {
        name: SIMPLE.to_string(),
        label: "Simple".to_string(),
        initial_state: "DRAFT".to_string(),
        states: states(vec![
            State::new("DRAFT", "Draft").author_only(),
            State::new("IN_REVIEW", "In review").inbox(),
            State::new("PUBLISHED", "Published").visible().published().tag("end"),
        ]),
        transitions: vec![
            Transition::new("submit", Some("DRAFT"), "IN_REVIEW", "Submit for review"),
            Transition::new("publish", Some("IN_REVIEW"), "PUBLISHED", "Publish")
                .with_job("Publishing")
                .with_help("Builds and releases the submission."),
        ],
    }
}

/// Editorial review with accept/reject, job-linked publish, and any-state
/// `withdraw`/`reset`.
pub fn default_workflow() -> Workflow {
    Workflow {
        name: DEFAULT.to_string(),
        label: "Default".to_string(),
        initial_state: "DRAFT".to_string(),
        states: states(vec![
            State::new("DRAFT", "Draft").author_only(),
            State::new("IN_REVIEW", "In review").inbox(),
            State::new("ACCEPTED", "Accepted").inbox(),
            State::new("REJECTED", "Rejected").tag("end").tag("error"),
            State::new("PUBLISHED", "Published").visible().published().tag("end"),
            State::new("WITHDRAWN", "Withdrawn").tag("end").tag("warning"),
        ]),
        transitions: vec![
            Transition::new("submit", Some("DRAFT"), "IN_REVIEW", "Submit for review"),
            Transition::new("accept", Some("IN_REVIEW"), "ACCEPTED", "Accept")
                .with_scopes(&[SCOPE_EDITOR]),
            Transition::new("reject", Some("IN_REVIEW"), "REJECTED", "Reject")
                .with_scopes(&[SCOPE_EDITOR]),
            Transition::new("publish", Some("ACCEPTED"), "PUBLISHED", "Publish")
                .with_job("Publishing")
                .with_scopes(&[SCOPE_PUBLISH])
                .with_help("Builds and releases the submission."),
            Transition::new("revise", Some("REJECTED"), "DRAFT", "Revise"),
            Transition::new("withdraw", None, "WITHDRAWN", "Withdraw")
                .with_help("Removes the submission from consideration."),
            Transition::new("reset", None, "DRAFT", "Reset to draft")
                .with_scopes(&[SCOPE_EDITOR])
                .system_only(),
        ],
    }
}

/// Every built-in workflow.
pub fn all() -> Vec<Workflow> {
    vec![simple(), default_workflow()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_shape() {
        let wf = simple();
        assert_eq!(wf.initial_state, "DRAFT");
        assert_eq!(wf.states.len(), 3);
        assert!(!wf.transition("submit").unwrap().requires_job);
        assert!(wf.transition("publish").unwrap().requires_job);
        assert!(wf.state("PUBLISHED").unwrap().published);
        assert!(wf.is_terminal("PUBLISHED"));
    }

    #[test]
    fn test_default_escape_hatches() {
        let wf = default_workflow();
        assert!(wf.transition("withdraw").unwrap().is_any_state());
        assert!(wf.transition("reset").unwrap().is_any_state());
        // exact-source revise beats any-state reset from REJECTED
        let names: Vec<_> = wf
            .available_transitions("REJECTED")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["revise", "withdraw"]);
    }

    #[test]
    fn test_builtin_names_unique() {
        let names: Vec<_> = all().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec![SIMPLE, DEFAULT]);
    }
}
