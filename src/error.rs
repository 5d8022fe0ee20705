//! Error types for Perchance generation.

use std::time::Duration;

/// Errors that can occur while talking to Perchance.
#[derive(Debug, thiserror::Error)]
pub enum PerchanceError {
    /// The server rejected the session key.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server rejected the request parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Transport failure, unexpected status or a failed key extraction.
    #[error("connection error: {0}")]
    Connection(String),

    /// A bounded operation ran past its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid client-side input, rejected before any network call.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`PerchanceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credential rejected; refresh and retry at a higher level.
    Auth,
    /// Request parameters rejected; fix the input.
    BadRequest,
    /// Transient or unknown failure, including deadline expiry.
    Connection,
    /// Invalid input caught locally.
    Configuration,
    /// Local file system failure.
    Io,
}

impl PerchanceError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Connection(_) | Self::Timeout(_) | Self::Network(_) | Self::Json(_) => {
                ErrorKind::Connection
            }
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if this error is likely transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Returns the suggested retry delay, if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout(_) => Some(Duration::from_secs(1)),
            Self::Connection(_) | Self::Network(_) | Self::Json(_) => {
                Some(Duration::from_secs(2))
            }
            _ => None,
        }
    }
}

/// Result type alias for Perchance operations.
pub type Result<T> = std::result::Result<T, PerchanceError>;
