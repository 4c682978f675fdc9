//! Business actions bound to workflow events.
//!
//! The [`ActionRegistry`] holds two ordered maps: event to handlers and
//! `(from, to)` status change to handlers. Compensations are registered
//! alongside the forward actions they undo.

mod error;
mod handler;
mod registry;

pub use error::ActionError;
pub use handler::{ActionHandler, Compensation, FnAction};
pub use registry::{ActionRegistry, SharedAction, SharedCompensation};
