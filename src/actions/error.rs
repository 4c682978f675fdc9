//! Action error types.

use crate::collaborators::CollaboratorError;
use thiserror::Error;

/// Errors returned by action handlers and compensations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    /// A collaborator call made by the action failed
    #[error("action '{action}' failed calling a collaborator: {source}")]
    Collaborator {
        action: String,
        #[source]
        source: CollaboratorError,
    },

    /// The action did not finish within the engine's action timeout
    #[error("action '{action}' timed out after {timeout_ms}ms")]
    TimedOut { action: String, timeout_ms: u64 },

    /// The action refused to run, e.g. because a payload field is missing
    #[error("action '{action}' rejected: {reason}")]
    Rejected { action: String, reason: String },
}

impl ActionError {
    pub fn collaborator(action: impl Into<String>, source: CollaboratorError) -> Self {
        Self::Collaborator {
            action: action.into(),
            source,
        }
    }

    pub fn rejected(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Self::Collaborator { action, .. }
            | Self::TimedOut { action, .. }
            | Self::Rejected { action, .. } => action,
        }
    }

    /// Whether running the emit again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Collaborator { source, .. } => source.is_transient(),
            Self::TimedOut { .. } => true,
            Self::Rejected { .. } => false,
        }
    }
}
