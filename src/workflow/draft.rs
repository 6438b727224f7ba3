//! Workflow drafts
//!
//! A draft is an unvalidated workflow document as read from TOML or JSON.
//! Keeping it untyped lets the validator report every missing or mistyped
//! field instead of stopping at the first deserialization error.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{validate_document, RegistryError, Violation, Workflow};

/// An unvalidated workflow document.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDraft {
    /// Where the draft came from, if it was read from disk.
    pub source: Option<PathBuf>,
    pub document: Value,
}

impl WorkflowDraft {
    pub fn from_value(document: Value) -> Self {
        Self {
            source: None,
            document,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RegistryError> {
        let parsed: toml::Value =
            toml::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?;
        let document = serde_json::to_value(parsed).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Ok(Self::from_value(document))
    }

    pub fn from_json_str(content: &str) -> Result<Self, RegistryError> {
        let document = serde_json::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Ok(Self::from_value(document))
    }

    /// Read a `.toml` or `.json` workflow file.
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Io(format!("{}: {}", path.display(), e)))?;
        let draft = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
        .map_err(|e| match e {
            RegistryError::Parse(msg) => RegistryError::Parse(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        Ok(Self {
            source: Some(path.to_path_buf()),
            ..draft
        })
    }

    /// Workflow name, if the document declares one.
    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    pub fn validate(&self) -> Vec<Violation> {
        validate_document(&self.document)
    }

    /// Validate and convert into an immutable workflow.
    pub fn into_workflow(self) -> Result<Workflow, RegistryError> {
        let name = self.name().unwrap_or("<unnamed>").to_string();
        let violations = self.validate();
        if !violations.is_empty() {
            return Err(RegistryError::Invalid { name, violations });
        }
        serde_json::from_value(self.document).map_err(|e| RegistryError::Parse(e.to_string()))
    }
}

impl From<Workflow> for WorkflowDraft {
    fn from(workflow: Workflow) -> Self {
        // Workflow serialization is infallible: string keys, plain fields
        let document = serde_json::to_value(&workflow).unwrap_or(Value::Null);
        Self::from_value(document)
    }
}
