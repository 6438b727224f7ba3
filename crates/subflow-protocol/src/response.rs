//! Response envelope.

use serde::{Deserialize, Serialize};
use crate::error::ApiError;

/// Response envelope for every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Envelope version (echoed from the request).
    pub protocol_version: i32,
    /// Request ID echoed from the request.
    pub request_id: String,
    /// Whether the operation succeeded.
    pub ok: bool,
    /// HTTP-equivalent status code.
    pub status: u16,
    /// Success payload (present when ok=true).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Error details (present when ok=false).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl ApiResponse {
    /// Create a success response.
    pub fn success(protocol_version: i32, request_id: String, payload: serde_json::Value) -> Self {
        Self {
            protocol_version,
            request_id,
            ok: true,
            status: 200,
            payload: Some(payload),
            error: None,
        }
    }

    /// Create an error response. The status is taken from the error code.
    pub fn error(protocol_version: i32, request_id: String, error: ApiError) -> Self {
        Self {
            protocol_version,
            request_id,
            ok: false,
            status: error.code.http_status(),
            payload: None,
            error: Some(error),
        }
    }
}
