//! Saga error types.

use crate::engine::{ErrorClass, WorkflowError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SagaError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// The step's event has no transition from the entity's current status.
    #[error("'{event}' rejected for '{urn}' in status '{status}'")]
    Rejected {
        urn: String,
        event: String,
        status: String,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("saga for '{urn}' aborted: {reason}")]
    Aborted { urn: String, reason: String },
}

impl SagaError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidOrder(_) | Self::Rejected { .. } => ErrorClass::BadRequest,
            Self::Workflow(error) => error.class(),
            Self::Aborted { .. } => ErrorClass::Unavailable,
        }
    }

    pub fn urn(&self) -> Option<&str> {
        match self {
            Self::InvalidOrder(_) => None,
            Self::Rejected { urn, .. } | Self::Aborted { urn, .. } => Some(urn),
            Self::Workflow(error) => error.urn(),
        }
    }
}
