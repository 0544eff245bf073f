//! Error Types

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, FlowError>;

/// Harness error types
#[derive(Error, Debug)]
pub enum FlowError {
    /// A required key, secret or credential is not configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Token endpoint answered with a non-success status
    #[error("Token request failed with status {status}: {body}")]
    UpstreamAuth { status: u16, body: String },

    /// Payment session id is not held in the session store
    #[error("Payment session not found: {0}")]
    SessionNotFound(String),

    /// Submitted amount disagrees with base amount plus surcharge
    #[error("Amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: i64, received: i64 },

    /// Forwarding destination name is not recognised
    #[error("Unknown forwarding destination: {0}")]
    UnknownDestination(String),

    /// Inbound request is missing or carries malformed fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Outbound call failed before an upstream status was received
    #[error("Upstream request failed: {0}")]
    UpstreamRelay(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// HTTP status this error is surfaced as
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::SessionNotFound(_) => 404,
            Self::AmountMismatch { .. } | Self::UnknownDestination(_) | Self::InvalidRequest(_) => {
                400
            }
            Self::Configuration(_)
            | Self::UpstreamAuth { .. }
            | Self::UpstreamRelay(_)
            | Self::Json(_) => 500,
        }
    }

    /// Stable machine-readable code for API responses
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::UpstreamAuth { .. } => "UPSTREAM_AUTH_ERROR",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::UnknownDestination(_) => "UNKNOWN_DESTINATION",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UpstreamRelay(_) => "UPSTREAM_ERROR",
            Self::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to a message that is safe to return to the browser
    pub fn user_message(&self) -> String {
        match self {
            Self::Configuration(msg) | Self::InvalidRequest(msg) => msg.clone(),
            Self::UpstreamAuth { .. } => "Failed to obtain an access token.".into(),
            Self::SessionNotFound(_) => "Payment session not found.".into(),
            Self::AmountMismatch { .. } => {
                "Payment amount does not match the expected total.".into()
            }
            Self::UnknownDestination(name) => format!("Unknown destination: {name}"),
            Self::UpstreamRelay(_) | Self::Json(_) => "Internal server error.".into(),
        }
    }
}
