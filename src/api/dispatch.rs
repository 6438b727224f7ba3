//! Envelope dispatcher.
//!
//! Routes request envelopes to the API handlers and wraps the result in a
//! response envelope.

use serde::de::DeserializeOwned;
use serde::Serialize;
use subflow_protocol::ops::{names, JobAbandonRequest, JobCallbackRequest, JobStatusRequest, TransitionRequest};
use subflow_protocol::{ApiError, ApiRequest, ApiResponse, PROTOCOL_VERSION};

use super::TransitionApi;
use crate::guard::Actor;

/// Dispatch a request envelope.
pub fn dispatch(api: &TransitionApi, request: &ApiRequest) -> ApiResponse {
    let op = request.op.as_str();
    let request_id = request.request_id.clone();

    if request.protocol_version != PROTOCOL_VERSION {
        return ApiResponse::error(
            request.protocol_version,
            request_id,
            ApiError::unsupported_protocol(request.protocol_version, PROTOCOL_VERSION),
        );
    }

    let result = match op {
        names::TRANSITION => match &request.actor {
            Some(actor) => payload::<TransitionRequest>(request)
                .and_then(|req| api.transition(&Actor::new(actor.clone()), &req))
                .and_then(to_value),
            None => Err(ApiError::unauthenticated(op)),
        },
        names::JOB_STATUS => payload::<JobStatusRequest>(request)
            .and_then(|req| api.job_status(&req.job_id))
            .and_then(to_value),
        names::JOB_CALLBACK => payload::<JobCallbackRequest>(request)
            .and_then(|req| api.job_callback(&req.job_id))
            .and_then(to_value),
        names::JOB_ABANDON => payload::<JobAbandonRequest>(request)
            .and_then(|req| api.job_abandon(&req.job_id))
            .and_then(to_value),
        _ => Err(ApiError::unknown_operation(op)),
    };

    match result {
        Ok(value) => ApiResponse::success(PROTOCOL_VERSION, request_id, value),
        Err(error) => ApiResponse::error(PROTOCOL_VERSION, request_id, error),
    }
}

fn payload<T: DeserializeOwned>(request: &ApiRequest) -> Result<T, ApiError> {
    serde_json::from_value(request.payload.clone())
        .map_err(|e| ApiError::invalid_request(format!("invalid {} payload: {}", request.op, e)))
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::invalid_request(e.to_string()))
}
