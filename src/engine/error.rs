//! Workflow error types.

use crate::actions::ActionError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors surfaced by [`WorkflowEngine`](super::WorkflowEngine).
///
/// An unmatched event is not an error; it is reported as
/// [`Emission::Unmatched`](super::Emission::Unmatched).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("urn must not be empty")]
    InvalidUrn,

    #[error("entity '{urn}' not found")]
    NotFound { urn: String },

    /// A bound handler failed. Nothing was persisted.
    #[error("action '{action}' failed for '{urn}' on '{event}': {source}")]
    ActionFailed {
        urn: String,
        event: String,
        action: String,
        #[source]
        source: ActionError,
    },

    /// The store could not load or save the entity.
    #[error("persistence failed for '{urn}': {source}")]
    PersistenceFailed {
        urn: String,
        #[source]
        source: StoreError,
    },

    /// The task running the emit terminated abnormally.
    #[error("emit for '{urn}' aborted: {reason}")]
    Aborted { urn: String, reason: String },
}

/// Coarse classification used by API layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Unavailable,
}

impl ErrorClass {
    /// HTTP status code equivalent.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::BadRequest => 400,
            Self::Unavailable => 503,
        }
    }
}

impl WorkflowError {
    pub(crate) fn from_store(urn: &str, error: StoreError) -> Self {
        match error {
            StoreError::NotFound { urn } => Self::NotFound { urn },
            source => Self::PersistenceFailed {
                urn: urn.to_string(),
                source,
            },
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::InvalidUrn | Self::ActionFailed { .. } => ErrorClass::BadRequest,
            Self::PersistenceFailed { .. } | Self::Aborted { .. } => ErrorClass::Unavailable,
        }
    }

    /// Whether redelivering the same event may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PersistenceFailed { .. } => true,
            Self::ActionFailed { source, .. } => source.is_transient(),
            Self::InvalidUrn | Self::NotFound { .. } | Self::Aborted { .. } => false,
        }
    }

    pub fn urn(&self) -> Option<&str> {
        match self {
            Self::InvalidUrn => None,
            Self::NotFound { urn }
            | Self::ActionFailed { urn, .. }
            | Self::PersistenceFailed { urn, .. }
            | Self::Aborted { urn, .. } => Some(urn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollaboratorError;

    #[test]
    fn classes_map_to_http_statuses() {
        let not_found = WorkflowError::NotFound { urn: "u".into() };
        let failed = WorkflowError::ActionFailed {
            urn: "u".into(),
            event: "e".into(),
            action: "a".into(),
            source: ActionError::rejected("a", "missing field"),
        };
        let offline = WorkflowError::from_store(
            "u",
            StoreError::Unavailable {
                reason: "down".into(),
            },
        );

        assert_eq!(not_found.class().http_status(), 404);
        assert_eq!(failed.class().http_status(), 400);
        assert_eq!(offline.class().http_status(), 503);
    }

    #[test]
    fn store_not_found_becomes_workflow_not_found() {
        let error = WorkflowError::from_store("u", StoreError::NotFound { urn: "u".into() });
        assert_eq!(error, WorkflowError::NotFound { urn: "u".into() });
    }

    #[test]
    fn transient_follows_the_underlying_cause() {
        let timeout = WorkflowError::ActionFailed {
            urn: "u".into(),
            event: "e".into(),
            action: "charge".into(),
            source: ActionError::collaborator(
                "charge",
                CollaboratorError::Timeout {
                    operation: "charge".into(),
                    timeout_ms: 10,
                },
            ),
        };
        let declined = WorkflowError::ActionFailed {
            urn: "u".into(),
            event: "e".into(),
            action: "charge".into(),
            source: ActionError::collaborator(
                "charge",
                CollaboratorError::Declined {
                    operation: "charge".into(),
                    reason: "no".into(),
                },
            ),
        };

        assert!(timeout.is_transient());
        assert!(!declined.is_transient());
        assert!(!WorkflowError::NotFound { urn: "u".into() }.is_transient());
    }
}
