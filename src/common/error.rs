//! # Error Types
//!
//! Typed failures surfaced by every discovery operation. All variants carry
//! owned data so a terminal result can be cloned out of a task handle as many
//! times as the caller asks for it.

use std::time::Duration;
use thiserror::Error;

/// Failure of a discovery call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscoveryError {
    /// The host environment is absent or has already been torn down.
    #[error("Invalid context: {0}")]
    InvalidContext(String),

    /// The request is missing its protocol version or application identifier.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Connecting to the discovery service or exchanging frames failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No reply arrived within the caller's deadline.
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The service answered but the reply could not be interpreted.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// The service explicitly reported that no cloudlet can serve the request.
    #[error("No cloudlet available for this request")]
    NoCloudlet,

    /// The service reported an error instead of a result.
    #[error("Rejected by discovery service: {0}")]
    Rejected(String),

    /// The task handle was cancelled by its caller.
    #[error("Call cancelled")]
    Cancelled,

    /// The worker pool could not be started or is no longer running.
    #[error("Executor error: {0}")]
    Executor(String),
}

impl DiscoveryError {
    /// Short, stable label used when aggregating failures.
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryError::InvalidContext(_) => "invalid_context",
            DiscoveryError::InvalidRequest(_) => "invalid_request",
            DiscoveryError::Transport(_) => "transport",
            DiscoveryError::DeadlineExceeded(_) => "deadline_exceeded",
            DiscoveryError::MalformedReply(_) => "malformed_reply",
            DiscoveryError::NoCloudlet => "no_cloudlet",
            DiscoveryError::Rejected(_) => "rejected",
            DiscoveryError::Cancelled => "cancelled",
            DiscoveryError::Executor(_) => "executor",
        }
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(e: std::io::Error) -> Self {
        DiscoveryError::Transport(e.to_string())
    }
}

/// Failure while reading one piece of device telemetry.
///
/// Never surfaced from request construction: the builder logs it and falls
/// back to defaults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("telemetry unavailable: {0}")]
    Unavailable(String),
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
