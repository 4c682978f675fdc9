//! Build errors for transitions and transition tables.

use crate::enforcement::ViolationError;
use thiserror::Error;

/// Errors that can occur when building transitions and tables.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial status not specified. Call .initial(status) before .build()")]
    MissingInitialStatus,

    #[error("No transitions defined. Add at least one transition")]
    NoTransitions,

    #[error("Transition source status not specified. Call .from(status)")]
    MissingFromStatus,

    #[error("Transition event not specified. Call .on(event)")]
    MissingEvent,

    #[error("Transition target status not specified. Call .to(status)")]
    MissingTargetStatus,

    #[error("Transition table violates {} definition rule(s): {}", .violations.len(), .violations.first().map(ToString::to_string).unwrap_or_default())]
    InvalidDefinition { violations: Vec<ViolationError> },
}
