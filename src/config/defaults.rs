//! Built-in engine defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Poll interval in milliseconds (default: 1000)
    pub poll_interval_ms: u64,

    /// Fetch once before the first wait (default: true)
    pub poll_immediately: bool,

    /// Consecutive transient failures tolerated (default: 3)
    pub num_retries: u32,

    /// Whether pollers run at all (default: true)
    pub poller_enabled: bool,

    /// Abandonment budget per job in seconds (default: 600 = 10 minutes)
    pub overall_seconds: u64,

    /// Directory holding workflow definitions (default: "workflows")
    pub workflows_dir: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            poll_immediately: true,
            num_retries: 3,
            poller_enabled: true,
            overall_seconds: 600,
            workflows_dir: "workflows".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "poller": {
                "interval_ms": self.poll_interval_ms,
                "poll_immediately": self.poll_immediately,
                "num_retries": self.num_retries,
                "enabled": self.poller_enabled
            },
            "budget": {
                "overall_seconds": self.overall_seconds
            },
            "workflows": {
                "dir": self.workflows_dir
            },
            "venues": {}
        })
    }
}
