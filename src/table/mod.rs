//! Declarative transition tables.
//!
//! A table is pure data: an initial status plus an ordered list of
//! `(from statuses, events, to status, guards)` rules. Matching is
//! first-passing-rule-wins in declaration order.

mod builder;
mod error;
mod matching;
mod transition;

pub use builder::{TableBuilder, TransitionBuilder};
pub use error::BuildError;
pub use matching::TransitionTable;
pub use transition::Transition;
