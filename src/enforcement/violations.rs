//! Definition violations and handling strategies.

use thiserror::Error;

/// Problems found when checking a transition table definition.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ViolationError {
    #[error("final status '{status}' has an outgoing transition on '{event}'")]
    TransitionFromFinal { status: String, event: String },

    #[error("failed status '{status}' is not final")]
    FailedNotFinal { status: String },

    #[error("initial status '{status}' is final")]
    FinalInitialStatus { status: String },

    #[error("transition to '{to}' has an empty {set} set")]
    EmptySet { to: String, set: &'static str },

    #[error("Custom check failed: {message}")]
    CustomCheckFailed { message: String },
}

/// Strategy for handling definition violations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViolationStrategy {
    /// Refuse to build the table
    Reject,

    /// Build anyway but log a warning per violation
    IgnoreAndLog,
}
