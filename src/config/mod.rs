//! Layered configuration
//!
//! Four layers merged in order:
//! 1. Built-in engine defaults
//! 2. Host/user config (~/.config/subflow/config.toml)
//! 3. Repo config (.subflow/config.toml)
//! 4. CLI overrides
//!
//! The merged value is extracted into a typed [`EngineConfig`].

mod defaults;
mod effective;
mod engine;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use engine::{BudgetSettings, EngineConfig, JobTypeBudget, PollerSettings, WorkflowSettings};
pub use merge::{deep_merge, merge_layers};

use std::path::PathBuf;

/// Relative path of the repo config file.
pub const REPO_CONFIG_PATH: &str = ".subflow/config.toml";

/// Default host config path, if a home directory is known.
pub fn host_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/subflow/config.toml"))
}
