//! Workflow validation
//!
//! Validation fails closed and reports every violation it finds, so a
//! workflow author gets complete feedback in one pass.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use super::Workflow;

/// What is wrong at a path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViolationKind {
    #[error("required field is missing")]
    MissingField,

    #[error("expected {expected}")]
    WrongType { expected: &'static str },

    #[error("must not be empty")]
    Empty,

    #[error("malformed: {message}")]
    Malformed { message: String },

    #[error("initial state '{state}' is not one of the workflow's states")]
    MissingInitialState { state: String },

    #[error("state '{state}' is not one of the workflow's states")]
    UnknownState { state: String },

    #[error("state keyed '{key}' is named '{name}'")]
    StateNameMismatch { key: String, name: String },

    #[error("transition needs an action or in-progress label")]
    EmptyLabels,

    #[error("transitions {names:?} share source {source_state:?} and target '{target}'")]
    DuplicateTransition {
        source_state: Option<String>,
        target: String,
        names: Vec<String>,
    },
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path into the workflow document (e.g. `transitions[2].labels`).
    pub path: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(path: impl Into<String>, kind: ViolationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Validate a typed workflow's references and authoring rules.
pub fn validate(workflow: &Workflow) -> Vec<Violation> {
    let mut violations = Vec::new();

    if workflow.name.trim().is_empty() {
        violations.push(Violation::new("name", ViolationKind::Empty));
    }
    if workflow.label.trim().is_empty() {
        violations.push(Violation::new("label", ViolationKind::Empty));
    }

    if workflow.states.is_empty() {
        violations.push(Violation::new("states", ViolationKind::Empty));
    }
    for (key, state) in &workflow.states {
        if state.name != *key {
            violations.push(Violation::new(
                format!("states.{}.name", key),
                ViolationKind::StateNameMismatch {
                    key: key.clone(),
                    name: state.name.clone(),
                },
            ));
        }
        if state.label.trim().is_empty() {
            violations.push(Violation::new(format!("states.{}.label", key), ViolationKind::Empty));
        }
    }

    if workflow.initial_state.trim().is_empty() {
        violations.push(Violation::new("initialState", ViolationKind::Empty));
    } else if !workflow.has_state(&workflow.initial_state) {
        violations.push(Violation::new(
            "initialState",
            ViolationKind::MissingInitialState {
                state: workflow.initial_state.clone(),
            },
        ));
    }

    let mut edges: BTreeMap<(Option<&str>, &str), Vec<String>> = BTreeMap::new();
    for (i, transition) in workflow.transitions.iter().enumerate() {
        let at = |field: &str| format!("transitions[{}].{}", i, field);

        if transition.name.trim().is_empty() {
            violations.push(Violation::new(at("name"), ViolationKind::Empty));
        }
        if !workflow.has_state(&transition.target_state_name) {
            violations.push(Violation::new(
                at("targetStateName"),
                ViolationKind::UnknownState {
                    state: transition.target_state_name.clone(),
                },
            ));
        }
        if let Some(source) = &transition.source_state_name {
            if !workflow.has_state(source) {
                violations.push(Violation::new(
                    at("sourceStateName"),
                    ViolationKind::UnknownState {
                        state: source.clone(),
                    },
                ));
            }
        }
        if transition.labels.is_empty() {
            violations.push(Violation::new(at("labels"), ViolationKind::EmptyLabels));
        }

        edges
            .entry((
                transition.source_state_name.as_deref(),
                transition.target_state_name.as_str(),
            ))
            .or_default()
            .push(transition.name.clone());
    }

    for ((source, target), names) in edges {
        if names.len() > 1 {
            violations.push(Violation::new(
                "transitions",
                ViolationKind::DuplicateTransition {
                    source_state: source.map(str::to_string),
                    target: target.to_string(),
                    names,
                },
            ));
        }
    }

    violations
}

/// Validate an untyped workflow document (parsed TOML or JSON).
///
/// Structural problems (missing fields, wrong types) are reported first; the
/// reference checks of [`validate`] only run once the document is well-formed.
pub fn validate_document(document: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();

    let root = match document.as_object() {
        Some(root) => root,
        None => {
            violations.push(Violation::new("$", ViolationKind::WrongType { expected: "a table" }));
            return violations;
        }
    };

    require_string(root, "name", "name", &mut violations);
    require_string(root, "label", "label", &mut violations);
    require_string(root, "initialState", "initialState", &mut violations);

    match field(root, "states") {
        None => violations.push(Violation::new("states", ViolationKind::MissingField)),
        Some(Value::Object(states)) => {
            if states.is_empty() {
                violations.push(Violation::new("states", ViolationKind::Empty));
            }
            for (key, state) in states {
                let base = format!("states.{}", key);
                match state.as_object() {
                    Some(state) => {
                        require_string(state, "name", &format!("{}.name", base), &mut violations);
                        require_string(state, "label", &format!("{}.label", base), &mut violations);
                        for flag in ["authorOnly", "inbox", "visible", "published"] {
                            require_bool(state, flag, &format!("{}.{}", base, flag), &mut violations);
                        }
                        if let Some(tags) = field(state, "tags") {
                            if !is_string_array(tags) {
                                violations.push(Violation::new(
                                    format!("{}.tags", base),
                                    ViolationKind::WrongType { expected: "an array of strings" },
                                ));
                            }
                        }
                    }
                    None => violations.push(Violation::new(base, ViolationKind::WrongType { expected: "a table" })),
                }
            }
        }
        Some(_) => violations.push(Violation::new("states", ViolationKind::WrongType { expected: "a table" })),
    }

    match field(root, "transitions") {
        None => violations.push(Violation::new("transitions", ViolationKind::MissingField)),
        Some(Value::Array(transitions)) => {
            for (i, transition) in transitions.iter().enumerate() {
                let base = format!("transitions[{}]", i);
                let Some(transition) = transition.as_object() else {
                    violations.push(Violation::new(base, ViolationKind::WrongType { expected: "a table" }));
                    continue;
                };
                require_string(transition, "name", &format!("{}.name", base), &mut violations);
                require_string(transition, "targetStateName", &format!("{}.targetStateName", base), &mut violations);
                match field(transition, "sourceStateName") {
                    None | Some(Value::Null) | Some(Value::String(_)) => {}
                    Some(_) => violations.push(Violation::new(
                        format!("{}.sourceStateName", base),
                        ViolationKind::WrongType { expected: "a string or null" },
                    )),
                }
                match field(transition, "labels") {
                    None => violations.push(Violation::new(format!("{}.labels", base), ViolationKind::MissingField)),
                    Some(Value::Object(labels)) if labels.is_empty() => {
                        violations.push(Violation::new(format!("{}.labels", base), ViolationKind::EmptyLabels))
                    }
                    Some(Value::Object(_)) => {}
                    Some(_) => violations.push(Violation::new(
                        format!("{}.labels", base),
                        ViolationKind::WrongType { expected: "a table" },
                    )),
                }
                require_bool(transition, "userTriggered", &format!("{}.userTriggered", base), &mut violations);
                require_bool(transition, "requiresJob", &format!("{}.requiresJob", base), &mut violations);
                match field(transition, "help") {
                    None | Some(Value::Null) => violations.push(Violation::new(format!("{}.help", base), ViolationKind::MissingField)),
                    Some(Value::String(_)) => {}
                    Some(_) => violations.push(Violation::new(
                        format!("{}.help", base),
                        ViolationKind::WrongType { expected: "a string" },
                    )),
                }
                match field(transition, "requiredScopes") {
                    None => {}
                    Some(scopes) if is_string_array(scopes) => {}
                    Some(_) => violations.push(Violation::new(
                        format!("{}.requiredScopes", base),
                        ViolationKind::WrongType { expected: "an array of strings" },
                    )),
                }
            }
        }
        Some(_) => violations.push(Violation::new("transitions", ViolationKind::WrongType { expected: "an array" })),
    }

    if !violations.is_empty() {
        return violations;
    }

    match serde_json::from_value::<Workflow>(document.clone()) {
        Ok(workflow) => validate(&workflow),
        Err(e) => vec![Violation::new(
            "$",
            ViolationKind::Malformed {
                message: e.to_string(),
            },
        )],
    }
}

/// Look up a camelCase key, falling back to its snake_case spelling.
fn field<'a>(object: &'a Map<String, Value>, camel: &str) -> Option<&'a Value> {
    object.get(camel).or_else(|| object.get(&to_snake_case(camel)))
}

fn to_snake_case(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for c in camel.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn require_string(object: &Map<String, Value>, key: &str, path: &str, violations: &mut Vec<Violation>) {
    match field(object, key) {
        None | Some(Value::Null) => violations.push(Violation::new(path, ViolationKind::MissingField)),
        Some(Value::String(s)) if s.trim().is_empty() => violations.push(Violation::new(path, ViolationKind::Empty)),
        Some(Value::String(_)) => {}
        Some(_) => violations.push(Violation::new(path, ViolationKind::WrongType { expected: "a string" })),
    }
}

fn require_bool(object: &Map<String, Value>, key: &str, path: &str, violations: &mut Vec<Violation>) {
    match field(object, key) {
        None | Some(Value::Null) => violations.push(Violation::new(path, ViolationKind::MissingField)),
        Some(Value::Bool(_)) => {}
        Some(_) => violations.push(Violation::new(path, ViolationKind::WrongType { expected: "a boolean" })),
    }
}

fn is_string_array(value: &Value) -> bool {
    value
        .as_array()
        .map(|items| items.iter().all(Value::is_string))
        .unwrap_or(false)
}
