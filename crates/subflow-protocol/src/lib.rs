//! Subflow Protocol Types
//!
//! Defines the JSON envelope and operation payloads exchanged between the
//! transition API, its clients, and the job runner.

pub mod error;
pub mod ops;
pub mod request;
pub mod response;

pub use error::{ApiError, ErrorCode};
pub use ops::{Job, JobStatus};
pub use request::ApiRequest;
pub use response::ApiResponse;

/// Current envelope version.
pub const PROTOCOL_VERSION: i32 = 1;
