//! Request envelope.

use serde::{Deserialize, Serialize};

/// Request envelope accepted by the transition API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Envelope version.
    pub protocol_version: i32,
    /// Operation name (see [`crate::ops::names`]).
    pub op: String,
    /// Caller-chosen request ID for correlation.
    pub request_id: String,
    /// Acting user. Absent for runner callbacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Operation-specific payload.
    pub payload: serde_json::Value,
}

impl ApiRequest {
    /// Build a request for the current protocol version.
    pub fn new(op: &str, request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            op: op.to_string(),
            request_id: request_id.into(),
            actor: None,
            payload,
        }
    }

    /// Attach the acting user.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}
