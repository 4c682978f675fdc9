//! Core workflow types and logic.
//!
//! This module contains the pure part of the orchestrator:
//! - Status and event definitions via the `Status` and `Event` traits
//! - The `Entity` contract
//! - Guard predicates over entity and payload
//! - Immutable status history
//!
//! Nothing in this module performs I/O.

mod entity;
mod guard;
mod history;
mod payload;
mod state;

pub use entity::Entity;
pub use guard::{first_rejection, Guard};
pub use history::{StatusChange, StatusHistory};
pub use payload::Payload;
pub use state::{Event, Status};
