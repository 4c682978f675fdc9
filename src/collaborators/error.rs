//! Collaborator error types.

use thiserror::Error;

/// Failures reported by external collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CollaboratorError {
    /// The call did not complete within its policy timeout
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The service could not be reached or answered with a retryable failure
    #[error("{operation} unavailable: {reason}")]
    Unavailable { operation: String, reason: String },

    /// The service refused the request; retrying will not help
    #[error("{operation} declined: {reason}")]
    Declined { operation: String, reason: String },
}

impl CollaboratorError {
    /// Timeouts and unavailability may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::Timeout { operation, .. }
            | Self::Unavailable { operation, .. }
            | Self::Declined { operation, .. } => operation,
        }
    }
}
