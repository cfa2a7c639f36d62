//! Error types for SimpleToolkit core

use simplekit_types::{FailureKind, TransferFailure};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the download core
#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Transfer not found: {0}")]
    NotFound(Uuid),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server responded with HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("No data received for {0} seconds")]
    Stalled(u64),

    #[error("Connection closed after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transfer was cancelled")]
    Cancelled,
}

impl ToolkitError {
    /// Malformed caller input, rejected before any transfer exists
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ToolkitError::Validation(_) | ToolkitError::InvalidDestination(_)
        )
    }

    /// Classify an error that ended a single transfer
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ToolkitError::Io(_) | ToolkitError::InvalidDestination(_) => FailureKind::Filesystem,
            _ => FailureKind::Network,
        }
    }

    /// The record stored on a failed transfer
    pub fn to_failure(&self) -> TransferFailure {
        TransferFailure {
            kind: self.failure_kind(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for ToolkitError {
    fn from(error: serde_json::Error) -> Self {
        ToolkitError::Serialization(error.to_string())
    }
}

// Allow converting to String for front-end layers
impl From<ToolkitError> for String {
    fn from(error: ToolkitError) -> Self {
        error.to_string()
    }
}

pub type Result<T, E = ToolkitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let io = ToolkitError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(io.failure_kind(), FailureKind::Filesystem);

        let status = ToolkitError::HttpStatus {
            status: 503,
            url: "http://example.com/a.dmg".into(),
        };
        assert_eq!(status.failure_kind(), FailureKind::Network);
        assert_eq!(status.to_failure().message, "Server responded with HTTP 503 for http://example.com/a.dmg");

        assert!(ToolkitError::Validation("empty url".into()).is_validation());
        assert!(!ToolkitError::Stalled(60).is_validation());
    }
}
