//! Venue-keyed workflow registry
//!
//! Built once from drafts and venue assignments, then shared read-only.
//! A broken workflow is quarantined together with every venue assigned to
//! it, so a venue never runs on a workflow that failed validation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use walkdir::WalkDir;

use super::{builtin, Violation, Workflow, WorkflowDraft};
use crate::error::EngineError;

/// Errors from loading workflows.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("workflow '{name}' has {} violation(s)", violations.len())]
    Invalid {
        name: String,
        violations: Vec<Violation>,
    },

    #[error("venue '{venue}' is assigned unknown workflow '{workflow}'")]
    UnknownWorkflow { venue: String, workflow: String },

    #[error("workflow '{0}' is defined more than once")]
    DuplicateWorkflow(String),

    #[error("Fingerprint error: {0}")]
    Fingerprint(String),
}

impl RegistryError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid { violations, .. } => violations,
            _ => &[],
        }
    }
}

/// An accepted workflow and its content fingerprint.
#[derive(Debug, Clone)]
pub struct RegisteredWorkflow {
    pub workflow: Arc<Workflow>,
    pub fingerprint: String,
}

/// Collects drafts and venue assignments.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    drafts: Vec<WorkflowDraft>,
    load_errors: Vec<RegistryError>,
    assignments: BTreeMap<String, String>,
    fallback: Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the built-in `SIMPLE` and `DEFAULT` workflows.
    pub fn with_builtins() -> Self {
        builtin::all()
            .into_iter()
            .fold(Self::new(), |builder, wf| builder.add_workflow(wf))
    }

    pub fn add_draft(mut self, draft: WorkflowDraft) -> Self {
        self.drafts.push(draft);
        self
    }

    pub fn add_workflow(self, workflow: Workflow) -> Self {
        self.add_draft(WorkflowDraft::from(workflow))
    }

    /// Load every `.toml` and `.json` file under `dir`.
    ///
    /// Unreadable or unparseable files are remembered and surface from
    /// [`build_strict`](Self::build_strict); a lenient build logs them.
    pub fn load_dir(mut self, dir: &Path) -> Result<Self, RegistryError> {
        if !dir.is_dir() {
            return Err(RegistryError::Io(format!("{}: not a directory", dir.display())));
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let at = e.path().unwrap_or(dir).display().to_string();
                    self.load_errors.push(RegistryError::Io(format!("{}: {}", at, e)));
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file()
                && matches!(path.extension().and_then(|e| e.to_str()), Some("toml") | Some("json"))
            {
                paths.push(entry.into_path());
            }
        }
        paths.sort();

        for path in paths {
            match WorkflowDraft::from_path(&path) {
                Ok(draft) => self.drafts.push(draft),
                Err(e) => self.load_errors.push(e),
            }
        }
        Ok(self)
    }

    /// Assign `workflow` to `venue`.
    pub fn assign(mut self, venue: impl Into<String>, workflow: impl Into<String>) -> Self {
        self.assignments.insert(venue.into(), workflow.into());
        self
    }

    /// Workflow used by venues without an explicit assignment.
    pub fn fallback(mut self, workflow: impl Into<String>) -> Self {
        self.fallback = Some(workflow.into());
        self
    }

    /// Build, quarantining broken workflows and the venues that use them.
    pub fn build(self) -> WorkflowRegistry {
        let (registry, errors) = self.assemble();
        for err in &errors {
            warn!(error = %err, "workflow quarantined");
        }
        registry
    }

    /// Build, failing on the first load or validation problem.
    pub fn build_strict(self) -> Result<WorkflowRegistry, RegistryError> {
        let (registry, mut errors) = self.assemble();
        if errors.is_empty() {
            Ok(registry)
        } else {
            Err(errors.remove(0))
        }
    }

    fn assemble(self) -> (WorkflowRegistry, Vec<RegistryError>) {
        let mut errors = self.load_errors;
        let mut workflows: BTreeMap<String, RegisteredWorkflow> = BTreeMap::new();
        let mut quarantined: BTreeMap<String, RegistryError> = BTreeMap::new();

        for draft in self.drafts {
            let name = draft.name().unwrap_or("<unnamed>").to_string();
            if workflows.contains_key(&name) || quarantined.contains_key(&name) {
                workflows.remove(&name);
                let err = RegistryError::DuplicateWorkflow(name.clone());
                errors.push(err.clone());
                quarantined.insert(name, err);
                continue;
            }
            let accepted = draft.into_workflow().and_then(|wf| {
                let fingerprint = wf.fingerprint()?;
                Ok(RegisteredWorkflow {
                    workflow: Arc::new(wf),
                    fingerprint,
                })
            });
            match accepted {
                Ok(registered) => {
                    info!(workflow = %name, fingerprint = %registered.fingerprint, "workflow registered");
                    workflows.insert(name, registered);
                }
                Err(err) => {
                    errors.push(err.clone());
                    quarantined.insert(name, err);
                }
            }
        }

        let mut venues = BTreeMap::new();
        for (venue, workflow) in self.assignments {
            if !workflows.contains_key(&workflow) && !quarantined.contains_key(&workflow) {
                let err = RegistryError::UnknownWorkflow {
                    venue: venue.clone(),
                    workflow: workflow.clone(),
                };
                errors.push(err.clone());
                quarantined.insert(workflow.clone(), err);
            }
            venues.insert(venue, workflow);
        }

        let registry = WorkflowRegistry {
            workflows,
            quarantined,
            venues,
            fallback: self.fallback,
        };
        (registry, errors)
    }
}

/// Immutable venue → workflow lookup.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, RegisteredWorkflow>,
    quarantined: BTreeMap<String, RegistryError>,
    venues: BTreeMap<String, String>,
    fallback: Option<String>,
}

impl WorkflowRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Workflow name serving `venue`, explicit assignment first.
    pub fn workflow_name_for(&self, venue: &str) -> Option<&str> {
        self.venues
            .get(venue)
            .or(self.fallback.as_ref())
            .map(String::as_str)
    }

    /// Workflow serving `venue`.
    pub fn workflow_for(&self, venue: &str) -> Result<Arc<Workflow>, EngineError> {
        let name = self
            .workflow_name_for(venue)
            .ok_or_else(|| EngineError::configuration(format!("venue '{}' has no workflow", venue)))?;
        if let Some(registered) = self.workflows.get(name) {
            return Ok(registered.workflow.clone());
        }
        match self.quarantined.get(name) {
            Some(reason) => Err(EngineError::Configuration {
                message: format!("venue '{}' uses quarantined workflow '{}': {}", venue, name, reason),
                violations: reason.violations().to_vec(),
            }),
            None => Err(EngineError::configuration(format!(
                "venue '{}' uses unknown workflow '{}'",
                venue, name
            ))),
        }
    }

    /// Look up an accepted workflow by name.
    pub fn workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(name).map(|r| r.workflow.clone())
    }

    pub fn fingerprint(&self, name: &str) -> Option<&str> {
        self.workflows.get(name).map(|r| r.fingerprint.as_str())
    }

    pub fn workflows(&self) -> impl Iterator<Item = &RegisteredWorkflow> {
        self.workflows.values()
    }

    /// Quarantined workflow names and why.
    pub fn quarantined(&self) -> impl Iterator<Item = (&str, &RegistryError)> {
        self.quarantined.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_venue_usable(&self, venue: &str) -> bool {
        self.workflow_for(venue).is_ok()
    }
}
