//! Error types for control calls.

use thiserror::Error;

/// Failure of a single call to the controlled device.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("Control connection closed")]
    Disconnected,

    #[error("Request failed: code={code}, comment={comment}")]
    RequestFailed { code: u32, comment: String },

    #[error("Request {request_type} timed out after {timeout_ms}ms")]
    Timeout {
        request_type: String,
        timeout_ms: u64,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControlError {
    /// Whether the device answered but rejected the request.
    ///
    /// Rejections mean the device is reachable; everything else is a
    /// transport-level failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::RequestFailed { .. })
    }
}

/// Result type alias for control calls.
pub type ControlResult<T> = std::result::Result<T, ControlError>;
