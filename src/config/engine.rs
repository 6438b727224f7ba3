//! Typed engine settings extracted from the merged configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effective::ConfigError;
use crate::poller::{PollBudget, PollerConfig, MAX_OVERALL_SECONDS};
use crate::workflow::{RegistryBuilder, RegistryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_ms: u64,
    pub poll_immediately: bool,
    pub num_retries: u32,
    pub enabled: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            poll_immediately: true,
            num_retries: 3,
            enabled: true,
        }
    }
}

/// Per-job-type override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobTypeBudget {
    pub overall_seconds: Option<u64>,
    pub max_polls: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub overall_seconds: u64,
    pub max_polls: Option<u64>,
    /// Keyed by job type (the transition name).
    pub per_job_type: BTreeMap<String, JobTypeBudget>,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            overall_seconds: 600,
            max_polls: None,
            per_job_type: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Resolved against the working directory.
    pub dir: PathBuf,
    /// Workflow for venues without an assignment.
    pub fallback: Option<String>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("workflows"),
            fallback: None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub poller: PollerSettings,
    pub budget: BudgetSettings,
    pub workflows: WorkflowSettings,
    /// venue → workflow name
    pub venues: BTreeMap<String, String>,
}

impl EngineConfig {
    /// Extract and validate from a merged config value.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let config: Self = if value.is_null() {
            Self::default()
        } else {
            serde_json::from_value(value.clone()).map_err(|e| ConfigError::ParseError(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poller.interval_ms must be greater than 0".to_string(),
            ));
        }
        check_overall("budget.overall_seconds", Some(self.budget.overall_seconds))?;
        check_polls("budget.max_polls", self.budget.max_polls)?;
        for (job_type, budget) in &self.budget.per_job_type {
            check_overall(
                &format!("budget.per_job_type.{}.overall_seconds", job_type),
                budget.overall_seconds,
            )?;
            check_polls(&format!("budget.per_job_type.{}.max_polls", job_type), budget.max_polls)?;
        }
        Ok(())
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poller.interval_ms),
            enabled: self.poller.enabled,
            poll_immediately: self.poller.poll_immediately,
            num_retries: self.poller.num_retries,
        }
    }

    pub fn default_budget(&self) -> PollBudget {
        PollBudget {
            overall: Some(Duration::from_secs(self.budget.overall_seconds)),
            max_polls: self.budget.max_polls,
        }
    }

    /// Budgets for job types with overrides. Unset fields inherit the default.
    pub fn job_type_budgets(&self) -> BTreeMap<String, PollBudget> {
        let default = self.default_budget();
        self.budget
            .per_job_type
            .iter()
            .map(|(job_type, o)| {
                let budget = PollBudget {
                    overall: o.overall_seconds.map(Duration::from_secs).or(default.overall),
                    max_polls: o.max_polls.or(default.max_polls),
                };
                (job_type.clone(), budget)
            })
            .collect()
    }

    /// Registry builder for this configuration.
    ///
    /// Loads `workflows.dir` (relative to `root`) when it exists, otherwise
    /// starts from the built-in workflows, then applies venue assignments.
    pub fn registry_builder(&self, root: &Path) -> Result<RegistryBuilder, RegistryError> {
        let dir = root.join(&self.workflows.dir);
        let mut builder = if dir.is_dir() {
            RegistryBuilder::new().load_dir(&dir)?
        } else {
            RegistryBuilder::with_builtins()
        };
        for (venue, workflow) in &self.venues {
            builder = builder.assign(venue.clone(), workflow.clone());
        }
        if let Some(fallback) = &self.workflows.fallback {
            builder = builder.fallback(fallback.clone());
        }
        Ok(builder)
    }
}

fn check_overall(key: &str, value: Option<u64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if v == 0 || v > MAX_OVERALL_SECONDS => Err(ConfigError::ValidationError(format!(
            "{} must be in (0, {}], got {}",
            key, MAX_OVERALL_SECONDS, v
        ))),
        _ => Ok(()),
    }
}

fn check_polls(key: &str, value: Option<u64>) -> Result<(), ConfigError> {
    if value == Some(0) {
        return Err(ConfigError::ValidationError(format!("{} must be greater than 0", key)));
    }
    Ok(())
}
