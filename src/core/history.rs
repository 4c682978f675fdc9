//! Status change history.
//!
//! Entities may keep an immutable record of the transitions applied to them.
//! The engine hands every committed change to [`Entity::record_change`]
//! before persisting.
//!
//! [`Entity::record_change`]: crate::core::Entity::record_change

use super::state::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single committed status change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StatusChange<S: Status> {
    /// The status being left
    pub from: S,
    /// The status being entered
    pub to: S,
    /// Wire name of the event that caused the change
    pub event: String,
    /// When the change was committed
    pub at: DateTime<Utc>,
}

impl<S: Status> StatusChange<S> {
    pub fn new(from: S, to: S, event: impl Into<String>) -> Self {
        Self {
            from,
            to,
            event: event.into(),
            at: Utc::now(),
        }
    }

    /// A change whose source and target status are equal.
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Ordered history of status changes.
///
/// History is immutable - `record` returns a new history with the change
/// appended.
///
/// # Example
///
/// ```rust
/// use flowstate::core::{StatusChange, StatusHistory};
/// use flowstate::workflow_status;
///
/// workflow_status! {
///     enum Phase {
///         One => "one",
///         Two => "two",
///         Three => "three",
///     }
///     final: [Three]
/// }
///
/// let history = StatusHistory::new()
///     .record(StatusChange::new(Phase::One, Phase::Two, "phase.advance"))
///     .record(StatusChange::new(Phase::Two, Phase::Three, "phase.advance"));
///
/// assert_eq!(history.path(), vec![&Phase::One, &Phase::Two, &Phase::Three]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StatusHistory<S: Status> {
    changes: Vec<StatusChange<S>>,
}

impl<S: Status> Default for StatusHistory<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Status> StatusHistory<S> {
    pub fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Record a change, returning a new history.
    ///
    /// The existing history is left untouched.
    pub fn record(&self, change: StatusChange<S>) -> Self {
        let mut changes = self.changes.clone();
        changes.push(change);
        Self { changes }
    }

    /// Statuses traversed: the first `from`, then every `to`.
    pub fn path(&self) -> Vec<&S> {
        let mut path = Vec::new();
        if let Some(first) = self.changes.first() {
            path.push(&first.from);
        }
        for change in &self.changes {
            path.push(&change.to);
        }
        path
    }

    /// Time between the first and the last recorded change.
    ///
    /// Returns `None` if there are no changes.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.changes.first(), self.changes.last()) {
            last.at.signed_duration_since(first.at).to_std().ok()
        } else {
            None
        }
    }

    /// Number of times an event has been committed.
    pub fn count_event(&self, event: &str) -> usize {
        self.changes.iter().filter(|c| c.event == event).count()
    }

    pub fn last(&self) -> Option<&StatusChange<S>> {
        self.changes.last()
    }

    pub fn changes(&self) -> &[StatusChange<S>] {
        &self.changes
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
